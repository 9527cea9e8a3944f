//! Supplier variants and the per-supplier namespace/tag tables that drive
//! SOAP request construction and response parsing.
//!
//! Every supplier speaks the same PromoStandards ProductData shapes but with
//! its own namespace URIs, wsVersion, and tag placement (some fields live in
//! the service namespace for one supplier and in the shared-objects namespace
//! for another). Adding a supplier means adding an enum variant plus one
//! profile table below; no parsing code changes.

use clap::ValueEnum;

/// Closed set of supported catalog suppliers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Supplier {
    /// SanMar (ProductDataService 2.0.0).
    #[value(name = "sanmar")]
    SanMar,
    /// Edwards Garment (ProductDataService 1.0.0).
    Edwards,
}

impl Supplier {
    /// Short lowercase label used in logs and CLI output.
    pub fn label(&self) -> &'static str {
        match self {
            Supplier::SanMar => "sanmar",
            Supplier::Edwards => "edwards",
        }
    }

    /// Namespace and tag table for this supplier.
    pub fn profile(&self) -> &'static SupplierProfile {
        match self {
            Supplier::SanMar => &SANMAR,
            Supplier::Edwards => &EDWARDS,
        }
    }
}

/// Which of the two supplier namespaces a tag belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Ns {
    /// The ProductDataService namespace (`ns2:` in supplier responses).
    Service,
    /// The SharedObjects namespace (`def:`/`ns3:` in supplier responses).
    Shared,
}

/// A namespace-qualified element name.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Tag {
    /// Namespace the element lives in for this supplier.
    pub ns: Ns,
    /// Local element name.
    pub name: &'static str,
}

const fn svc(name: &'static str) -> Tag {
    Tag {
        ns: Ns::Service,
        name,
    }
}

const fn shr(name: &'static str) -> Tag {
    Tag {
        ns: Ns::Shared,
        name,
    }
}

/// Part-level boolean flags recognized during normalization.
pub const FLAG_NAMES: [&str; 5] = [
    "isRushService",
    "isCloseout",
    "isCaution",
    "isOnDemand",
    "isHazmat",
];

/// Tag placement table for one supplier's detail responses.
///
/// Field order mirrors the normalization algorithm: scalars, descriptions,
/// keywords, categories, then per-part variant data.
#[derive(Debug)]
pub struct FieldTags {
    /// Root product element.
    pub product: Tag,
    /// Supplier-assigned product identifier.
    pub product_id: Tag,
    /// Display name.
    pub name: Tag,
    /// Brand name.
    pub brand: Tag,
    /// Primary image URL; `None` for suppliers that never send one.
    pub image_url: Option<Tag>,
    /// Description fragment elements (repeated, direct children).
    pub description: Tag,
    /// Keyword container element.
    pub keyword_array: Tag,
    /// Keyword entry element inside the container.
    pub keyword_entry: Tag,
    /// Keyword text element inside an entry.
    pub keyword: Tag,
    /// Category container element.
    pub category_array: Tag,
    /// Category entry element inside the container.
    pub category_entry: Tag,
    /// Category name element.
    pub category: Tag,
    /// Comma-separated subcategory element.
    pub subcategory: Tag,
    /// Product part (variant) container element.
    pub part_array: Tag,
    /// Product part entry element.
    pub part: Tag,
    /// Path from a part to its primary color name.
    pub primary_color: [Tag; 3],
    /// Path from a part to each secondary color name.
    pub color_array: [Tag; 3],
    /// Apparel size sub-structure on a part.
    pub apparel_size: Tag,
    /// Label size element inside the apparel size structure.
    pub label_size: Tag,
    /// GTIN element on a part.
    pub gtin: Tag,
    /// Namespace the boolean flag elements live in.
    pub flag_ns: Ns,
}

/// Namespace URIs, protocol version, and tag table for one supplier.
#[derive(Debug)]
pub struct SupplierProfile {
    /// Which supplier this profile describes.
    pub supplier: Supplier,
    /// ProductDataService namespace URI.
    pub service_ns: &'static str,
    /// SharedObjects namespace URI.
    pub shared_ns: &'static str,
    /// wsVersion value sent in every request envelope.
    pub ws_version: &'static str,
    /// Tag placement table for detail responses.
    pub tags: FieldTags,
}

impl SupplierProfile {
    /// Resolves a tag to its `(namespace URI, local name)` pair.
    pub fn resolve(&self, tag: Tag) -> (&'static str, &'static str) {
        (self.ns_uri(tag.ns), tag.name)
    }

    /// Namespace URI for the given alias.
    pub fn ns_uri(&self, ns: Ns) -> &'static str {
        match ns {
            Ns::Service => self.service_ns,
            Ns::Shared => self.shared_ns,
        }
    }
}

static SANMAR: SupplierProfile = SupplierProfile {
    supplier: Supplier::SanMar,
    service_ns: "http://www.promostandards.org/WSDL/ProductDataService/2.0.0/",
    shared_ns: "http://www.promostandards.org/WSDL/ProductDataService/2.0.0/SharedObjects/",
    ws_version: "2.0.0",
    tags: FieldTags {
        product: svc("Product"),
        product_id: shr("productId"),
        name: shr("productName"),
        brand: shr("productBrand"),
        image_url: Some(shr("primaryImageUrl")),
        description: shr("description"),
        keyword_array: svc("ProductKeywordArray"),
        keyword_entry: shr("ProductKeyword"),
        keyword: shr("keyword"),
        category_array: svc("ProductCategoryArray"),
        category_entry: shr("ProductCategory"),
        category: shr("category"),
        subcategory: shr("subCategory"),
        part_array: svc("ProductPartArray"),
        part: svc("ProductPart"),
        primary_color: [svc("primaryColor"), shr("Color"), shr("standardColorName")],
        color_array: [svc("ColorArray"), shr("Color"), shr("standardColorName")],
        apparel_size: shr("ApparelSize"),
        label_size: shr("labelSize"),
        gtin: shr("gtin"),
        flag_ns: Ns::Shared,
    },
};

static EDWARDS: SupplierProfile = SupplierProfile {
    supplier: Supplier::Edwards,
    service_ns: "http://www.promostandards.org/WSDL/ProductDataService/1.0.0/",
    shared_ns: "http://www.promostandards.org/WSDL/ProductDataService/1.0.0/SharedObjects/",
    ws_version: "1.0.0",
    tags: FieldTags {
        product: svc("Product"),
        product_id: shr("productId"),
        name: svc("productName"),
        brand: svc("productBrand"),
        // Edwards never sends an image element.
        image_url: None,
        description: shr("description"),
        keyword_array: svc("ProductKeywordArray"),
        keyword_entry: svc("ProductKeyword"),
        keyword: svc("keyword"),
        category_array: svc("ProductCategoryArray"),
        category_entry: svc("ProductCategory"),
        category: svc("category"),
        subcategory: shr("subCategory"),
        part_array: svc("ProductPartArray"),
        part: svc("ProductPart"),
        primary_color: [svc("primaryColor"), shr("Color"), shr("standardColorName")],
        color_array: [svc("ColorArray"), svc("Color"), svc("colorName")],
        apparel_size: shr("ApparelSize"),
        label_size: shr("labelSize"),
        gtin: shr("gtin"),
        flag_ns: Ns::Shared,
    },
};
