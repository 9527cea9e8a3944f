//! Supplier XML normalization into the canonical product record.
//!
//! Parsing is table-driven: the same walk runs for every supplier, with the
//! [`SupplierProfile`](crate::supplier::SupplierProfile) tag table deciding
//! which namespace each field lives in. Two behaviors are intentional quirks
//! carried over from the upstream feed semantics and must not be "fixed":
//! GTIN is last-wins across parts, and flags keep the last scanned non-empty
//! value per key rather than OR-ing across parts.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::supplier::{SupplierProfile, Tag, FLAG_NAMES};

/// Canonical, supplier-agnostic product representation.
///
/// `product_id` is never empty in a record returned by [`normalize`];
/// everything else is optional or may be empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    /// Supplier-assigned identifier; primary key in the relational store.
    pub product_id: String,
    /// Display name, when the supplier sends one.
    pub name: Option<String>,
    /// Brand name, when the supplier sends one.
    pub brand: Option<String>,
    /// Primary image URL; only some suppliers provide this.
    pub image_url: Option<String>,
    /// All description fragments joined with single spaces (possibly empty).
    pub description: String,
    /// Ordered keyword list; duplicates are not removed at this layer.
    pub keywords: Vec<String>,
    /// Top-level categories plus exploded comma-separated subcategories.
    pub categories: BTreeSet<String>,
    /// Colors aggregated across all product parts.
    pub colors: BTreeSet<String>,
    /// Label sizes aggregated across all product parts.
    pub sizes: BTreeSet<String>,
    /// Last non-empty GTIN seen across parts in document order.
    pub gtin: Option<String>,
    /// Boolean flags explicitly populated by at least one part.
    pub flags: BTreeMap<String, bool>,
}

/// Errors surfaced while normalizing a detail response.
#[derive(Debug)]
pub enum NormalizeError {
    /// The response body was not well-formed XML.
    Malformed(roxmltree::Error),
    /// The expected product element is absent from the document.
    MissingProduct,
    /// A product element exists but carries no product identifier.
    MissingProductId,
}

impl fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(err) => write!(f, "malformed detail XML: {err}"),
            Self::MissingProduct => write!(f, "no product element in detail response"),
            Self::MissingProductId => write!(f, "product element missing productId"),
        }
    }
}

impl std::error::Error for NormalizeError {}

/// Parses a raw detail response into a [`ProductRecord`].
///
/// Pure over its inputs; the profile's tag table supplies every
/// namespace/name pair so supplier variants share this single code path.
pub fn normalize(xml: &str, profile: &SupplierProfile) -> Result<ProductRecord, NormalizeError> {
    let doc = Document::parse(xml).map_err(NormalizeError::Malformed)?;
    let tags = &profile.tags;

    let product = find_descendant(doc.root(), profile, tags.product)
        .ok_or(NormalizeError::MissingProduct)?;

    let product_id =
        child_text(product, profile, tags.product_id).ok_or(NormalizeError::MissingProductId)?;

    let name = child_text(product, profile, tags.name);
    let brand = child_text(product, profile, tags.brand);
    let image_url = tags
        .image_url
        .and_then(|tag| child_text(product, profile, tag));

    let description = children(product, profile, tags.description)
        .filter_map(trimmed_text)
        .collect::<Vec<_>>()
        .join(" ");

    let mut keywords = Vec::new();
    if let Some(array) = child(product, profile, tags.keyword_array) {
        for entry in children(array, profile, tags.keyword_entry) {
            if let Some(keyword) = child_text(entry, profile, tags.keyword) {
                keywords.push(keyword);
            }
        }
    }

    let mut categories = BTreeSet::new();
    if let Some(array) = child(product, profile, tags.category_array) {
        for entry in children(array, profile, tags.category_entry) {
            if let Some(category) = child_text(entry, profile, tags.category) {
                categories.insert(category);
            }
            if let Some(subcategory) = child_text(entry, profile, tags.subcategory) {
                // Subcategories arrive comma-separated; each piece stands alone.
                for piece in subcategory.split(',') {
                    let piece = piece.trim();
                    if !piece.is_empty() {
                        categories.insert(piece.to_string());
                    }
                }
            }
        }
    }

    let mut colors = BTreeSet::new();
    let mut sizes = BTreeSet::new();
    let mut gtin = None;
    let mut flags = BTreeMap::new();

    if let Some(array) = child(product, profile, tags.part_array) {
        for part in children(array, profile, tags.part) {
            if let Some(color) = path_text(part, profile, &tags.primary_color) {
                colors.insert(color);
            }
            collect_color_array(part, profile, &tags.color_array, &mut colors);

            if let Some(apparel) = child(part, profile, tags.apparel_size) {
                if let Some(size) = child_text(apparel, profile, tags.label_size) {
                    sizes.insert(size);
                }
            }

            // Later parts overwrite earlier GTINs; source ordering puts the
            // more specific SKUs last.
            if let Some(value) = child_text(part, profile, tags.gtin) {
                gtin = Some(value);
            }

            let flag_ns = profile.ns_uri(tags.flag_ns);
            for flag_name in FLAG_NAMES {
                if let Some(node) = part.children().find(|n| is_named(n, flag_ns, flag_name)) {
                    if let Some(text) = trimmed_text(node) {
                        // Last scanned non-empty value per key, not an OR.
                        flags.insert(flag_name.to_string(), text.eq_ignore_ascii_case("true"));
                    }
                }
            }
        }
    }

    Ok(ProductRecord {
        product_id,
        name,
        brand,
        image_url,
        description,
        keywords,
        categories,
        colors,
        sizes,
        gtin,
        flags,
    })
}

/// Reports whether a detail response contains the expected product element
/// without building a record. Used by the fetch path to classify "no data"
/// responses.
pub fn has_product_element(xml: &str, profile: &SupplierProfile) -> bool {
    match Document::parse(xml) {
        Ok(doc) => find_descendant(doc.root(), profile, profile.tags.product).is_some(),
        Err(_) => false,
    }
}

fn is_named(node: &Node<'_, '_>, ns: &str, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name && node.tag_name().namespace() == Some(ns)
}

fn find_descendant<'a>(
    root: Node<'a, 'a>,
    profile: &SupplierProfile,
    tag: Tag,
) -> Option<Node<'a, 'a>> {
    let (ns, name) = profile.resolve(tag);
    root.descendants().find(|node| is_named(node, ns, name))
}

fn child<'a>(parent: Node<'a, 'a>, profile: &SupplierProfile, tag: Tag) -> Option<Node<'a, 'a>> {
    let (ns, name) = profile.resolve(tag);
    parent.children().find(|node| is_named(node, ns, name))
}

fn children<'a>(
    parent: Node<'a, 'a>,
    profile: &SupplierProfile,
    tag: Tag,
) -> impl Iterator<Item = Node<'a, 'a>> {
    let (ns, name) = profile.resolve(tag);
    parent
        .children()
        .filter(move |node| is_named(node, ns, name))
}

fn trimmed_text(node: Node<'_, '_>) -> Option<String> {
    node.text()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn child_text(parent: Node<'_, '_>, profile: &SupplierProfile, tag: Tag) -> Option<String> {
    child(parent, profile, tag).and_then(trimmed_text)
}

fn path_text(parent: Node<'_, '_>, profile: &SupplierProfile, path: &[Tag; 3]) -> Option<String> {
    let first = child(parent, profile, path[0])?;
    let second = child(first, profile, path[1])?;
    child_text(second, profile, path[2])
}

fn collect_color_array(
    part: Node<'_, '_>,
    profile: &SupplierProfile,
    path: &[Tag; 3],
    colors: &mut BTreeSet<String>,
) {
    let Some(array) = child(part, profile, path[0]) else {
        return;
    };
    for entry in children(array, profile, path[1]) {
        if let Some(color) = child_text(entry, profile, path[2]) {
            colors.insert(color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supplier::Supplier;

    fn sanmar_detail(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<S:Envelope xmlns:S="http://schemas.xmlsoap.org/soap/envelope/">
  <S:Body>
    <ns2:GetProductResponse
        xmlns:ns2="http://www.promostandards.org/WSDL/ProductDataService/2.0.0/"
        xmlns:def="http://www.promostandards.org/WSDL/ProductDataService/2.0.0/SharedObjects/">
      {body}
    </ns2:GetProductResponse>
  </S:Body>
</S:Envelope>"#
        )
    }

    fn sanmar_fixture() -> String {
        sanmar_detail(
            r#"<ns2:Product>
        <def:productId>PC54</def:productId>
        <def:productName>Core Cotton Tee</def:productName>
        <def:productBrand>Port &amp; Company</def:productBrand>
        <def:primaryImageUrl>https://cdn.example.com/pc54.jpg</def:primaryImageUrl>
        <def:description>Soft cotton.</def:description>
        <def:description>Machine washable.</def:description>
        <ns2:ProductKeywordArray>
          <def:ProductKeyword><def:keyword>tee</def:keyword></def:ProductKeyword>
          <def:ProductKeyword><def:keyword>cotton</def:keyword></def:ProductKeyword>
          <def:ProductKeyword><def:keyword>tee</def:keyword></def:ProductKeyword>
        </ns2:ProductKeywordArray>
        <ns2:ProductCategoryArray>
          <def:ProductCategory>
            <def:category>T-Shirts</def:category>
            <def:subCategory>Tees, Tanks</def:subCategory>
          </def:ProductCategory>
        </ns2:ProductCategoryArray>
        <ns2:ProductPartArray>
          <ns2:ProductPart>
            <ns2:primaryColor>
              <def:Color><def:standardColorName>Black</def:standardColorName></def:Color>
            </ns2:primaryColor>
            <ns2:ColorArray>
              <def:Color><def:standardColorName>Jet Black</def:standardColorName></def:Color>
            </ns2:ColorArray>
            <def:ApparelSize><def:labelSize>S</def:labelSize></def:ApparelSize>
            <def:gtin>111</def:gtin>
            <def:isHazmat>false</def:isHazmat>
          </ns2:ProductPart>
          <ns2:ProductPart>
            <ns2:primaryColor>
              <def:Color><def:standardColorName>Red</def:standardColorName></def:Color>
            </ns2:primaryColor>
            <def:ApparelSize><def:labelSize>M</def:labelSize></def:ApparelSize>
            <def:gtin>222</def:gtin>
            <def:isHazmat>true</def:isHazmat>
            <def:isCloseout>false</def:isCloseout>
          </ns2:ProductPart>
        </ns2:ProductPartArray>
      </ns2:Product>"#,
        )
    }

    #[test]
    fn joins_description_fragments_with_spaces() {
        let record = normalize(&sanmar_fixture(), Supplier::SanMar.profile()).unwrap();
        assert_eq!(record.description, "Soft cotton. Machine washable.");
    }

    #[test]
    fn extracts_scalars_and_keywords_in_order() {
        let record = normalize(&sanmar_fixture(), Supplier::SanMar.profile()).unwrap();
        assert_eq!(record.product_id, "PC54");
        assert_eq!(record.name.as_deref(), Some("Core Cotton Tee"));
        assert_eq!(record.brand.as_deref(), Some("Port & Company"));
        assert_eq!(
            record.image_url.as_deref(),
            Some("https://cdn.example.com/pc54.jpg")
        );
        // Ordered, duplicates preserved.
        assert_eq!(record.keywords, vec!["tee", "cotton", "tee"]);
    }

    #[test]
    fn explodes_comma_separated_subcategories() {
        let record = normalize(&sanmar_fixture(), Supplier::SanMar.profile()).unwrap();
        let expected: BTreeSet<String> = ["T-Shirts", "Tees", "Tanks"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(record.categories, expected);
    }

    #[test]
    fn aggregates_part_colors_and_sizes() {
        let record = normalize(&sanmar_fixture(), Supplier::SanMar.profile()).unwrap();
        let colors: Vec<&str> = record.colors.iter().map(String::as_str).collect();
        assert_eq!(colors, vec!["Black", "Jet Black", "Red"]);
        let sizes: Vec<&str> = record.sizes.iter().map(String::as_str).collect();
        assert_eq!(sizes, vec!["M", "S"]);
    }

    #[test]
    fn gtin_takes_last_non_empty_part_value() {
        let record = normalize(&sanmar_fixture(), Supplier::SanMar.profile()).unwrap();
        assert_eq!(record.gtin.as_deref(), Some("222"));
    }

    #[test]
    fn flags_keep_last_scanned_value_per_key() {
        let record = normalize(&sanmar_fixture(), Supplier::SanMar.profile()).unwrap();
        // Part A says false, part B says true: last scan wins.
        assert_eq!(record.flags.get("isHazmat"), Some(&true));
        // Only ever false, but explicitly populated, so the key is present.
        assert_eq!(record.flags.get("isCloseout"), Some(&false));
        // Never populated by any part.
        assert!(!record.flags.contains_key("isRushService"));
    }

    #[test]
    fn missing_product_element_is_an_error_not_a_panic() {
        let xml = sanmar_detail("<ns2:ErrorMessage><def:code>404</def:code></ns2:ErrorMessage>");
        match normalize(&xml, Supplier::SanMar.profile()) {
            Err(NormalizeError::MissingProduct) => {}
            other => panic!("expected MissingProduct, got {other:?}"),
        }
        assert!(!has_product_element(&xml, Supplier::SanMar.profile()));
    }

    #[test]
    fn product_without_id_is_rejected() {
        let xml =
            sanmar_detail("<ns2:Product><def:productName>Nameless</def:productName></ns2:Product>");
        match normalize(&xml, Supplier::SanMar.profile()) {
            Err(NormalizeError::MissingProductId) => {}
            other => panic!("expected MissingProductId, got {other:?}"),
        }
    }

    #[test]
    fn malformed_xml_is_reported() {
        assert!(matches!(
            normalize("<unclosed", Supplier::SanMar.profile()),
            Err(NormalizeError::Malformed(_))
        ));
    }

    #[test]
    fn edwards_dialect_parses_with_its_own_tag_table() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<S:Envelope xmlns:S="http://schemas.xmlsoap.org/soap/envelope/">
  <S:Body>
    <ns2:GetProductResponse
        xmlns:ns2="http://www.promostandards.org/WSDL/ProductDataService/1.0.0/"
        xmlns:ns3="http://www.promostandards.org/WSDL/ProductDataService/1.0.0/SharedObjects/">
      <ns2:Product>
        <ns3:productId>1027</ns3:productId>
        <ns2:productName>Batiste Cafe Shirt</ns2:productName>
        <ns2:productBrand>Edwards</ns2:productBrand>
        <ns3:description>Easy care blend.</ns3:description>
        <ns2:ProductKeywordArray>
          <ns2:ProductKeyword><ns2:keyword>shirt</ns2:keyword></ns2:ProductKeyword>
        </ns2:ProductKeywordArray>
        <ns2:ProductCategoryArray>
          <ns2:ProductCategory>
            <ns2:category>Wovens</ns2:category>
          </ns2:ProductCategory>
        </ns2:ProductCategoryArray>
        <ns2:ProductPartArray>
          <ns2:ProductPart>
            <ns2:primaryColor>
              <ns3:Color><ns3:standardColorName>Navy</ns3:standardColorName></ns3:Color>
            </ns2:primaryColor>
            <ns2:ColorArray>
              <ns2:Color><ns2:colorName>French Blue</ns2:colorName></ns2:Color>
            </ns2:ColorArray>
            <ns3:ApparelSize><ns3:labelSize>L</ns3:labelSize></ns3:ApparelSize>
          </ns2:ProductPart>
        </ns2:ProductPartArray>
      </ns2:Product>
    </ns2:GetProductResponse>
  </S:Body>
</S:Envelope>"#;

        let record = normalize(xml, Supplier::Edwards.profile()).unwrap();
        assert_eq!(record.product_id, "1027");
        assert_eq!(record.name.as_deref(), Some("Batiste Cafe Shirt"));
        assert_eq!(record.image_url, None);
        assert!(record.colors.contains("Navy"));
        assert!(record.colors.contains("French Blue"));
        assert!(record.sizes.contains("L"));
        assert_eq!(record.keywords, vec!["shirt"]);
    }
}
