//! Live inventory lookups against the supplier Inventory SOAP service.
//!
//! Separate from the catalog sync path: inventory is queried on demand per
//! product and never persisted.

use std::time::Duration;

use anyhow::{Context, Result};
use roxmltree::Document;
use serde::Serialize;

use crate::soap::{xml_escape, SoapCredentials};

const INVENTORY_NS: &str = "http://www.promostandards.org/WSDL/Inventory/2.0.0/";
const INVENTORY_SHARED_NS: &str =
    "http://www.promostandards.org/WSDL/Inventory/2.0.0/SharedObjects/";
const INVENTORY_WS_VERSION: &str = "2.0.0";

/// Stock on hand at one supplier location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryLevel {
    /// Supplier location identifier.
    pub location: String,
    /// Units available at that location.
    pub quantity: i64,
}

/// HTTP client for one supplier's Inventory SOAP endpoint.
pub struct InventoryClient {
    http: reqwest::Client,
    endpoint: String,
    credentials: SoapCredentials,
}

impl InventoryClient {
    /// Builds a client bound to one inventory endpoint.
    pub fn new(endpoint: String, credentials: SoapCredentials, timeout: Duration) -> Result<Self> {
        anyhow::ensure!(
            endpoint.starts_with("http://") || endpoint.starts_with("https://"),
            "inventory endpoint must be an http(s) URL"
        );
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build inventory HTTP client")?;
        Ok(Self {
            http,
            endpoint,
            credentials,
        })
    }

    /// Fetches current per-location inventory for a product, optionally
    /// narrowed to one color and one size.
    pub async fn check_inventory(
        &self,
        product_id: &str,
        color: Option<&str>,
        size: Option<&str>,
    ) -> Result<Vec<InventoryLevel>> {
        let envelope = inventory_envelope(&self.credentials, product_id, color, size);
        let response = self
            .http
            .post(&self.endpoint)
            .header("Content-Type", "text/xml")
            .body(envelope)
            .send()
            .await
            .with_context(|| format!("inventory request failed for {product_id}"))?;
        let status = response.status();
        anyhow::ensure!(
            status.is_success(),
            "inventory endpoint returned {status} for {product_id}"
        );
        let body = response
            .text()
            .await
            .context("failed to read inventory response body")?;
        parse_inventory_levels(&body)
    }
}

fn inventory_envelope(
    credentials: &SoapCredentials,
    product_id: &str,
    color: Option<&str>,
    size: Option<&str>,
) -> String {
    let mut filter = String::new();
    if let Some(color) = color {
        filter.push_str(&format!(
            "<shar:PartColorArray><shar:partColor>{}</shar:partColor></shar:PartColorArray>",
            xml_escape(color)
        ));
    }
    if let Some(size) = size {
        filter.push_str(&format!(
            "<shar:LabelSizeArray><shar:labelSize>{}</shar:labelSize></shar:LabelSizeArray>",
            xml_escape(size)
        ));
    }
    let filter_block = if filter.is_empty() {
        String::new()
    } else {
        format!("<shar:Filter>{filter}</shar:Filter>")
    };
    format!(
        r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" xmlns:ns="{INVENTORY_NS}" xmlns:shar="{INVENTORY_SHARED_NS}"><soapenv:Header/><soapenv:Body><ns:GetInventoryLevelsRequest><shar:wsVersion>{INVENTORY_WS_VERSION}</shar:wsVersion><shar:id>{}</shar:id><shar:password>{}</shar:password><shar:productId>{}</shar:productId>{filter_block}</ns:GetInventoryLevelsRequest></soapenv:Body></soapenv:Envelope>"#,
        xml_escape(&credentials.id),
        xml_escape(&credentials.password),
        xml_escape(product_id)
    )
}

// Suppliers answer inventory calls under slightly different namespace
// arrangements, so locations are matched by local name only.
fn parse_inventory_levels(xml: &str) -> Result<Vec<InventoryLevel>> {
    let doc = Document::parse(xml).context("malformed inventory response")?;
    let mut levels = Vec::new();
    for location in doc
        .descendants()
        .filter(|node| node.is_element() && node.tag_name().name() == "InventoryLocation")
    {
        let id = location
            .descendants()
            .find(|node| node.is_element() && node.tag_name().name() == "inventoryLocationId")
            .and_then(|node| node.text())
            .map(str::trim)
            .filter(|text| !text.is_empty());
        let Some(id) = id else {
            continue;
        };
        let quantity = location
            .descendants()
            .find(|node| node.is_element() && node.tag_name().name() == "value")
            .and_then(|node| node.text())
            .and_then(|text| text.trim().parse::<i64>().ok())
            .unwrap_or(0);
        levels.push(InventoryLevel {
            location: id.to_string(),
            quantity,
        });
    }
    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_carries_filters_only_when_given() {
        let credentials = SoapCredentials {
            id: "acct".into(),
            password: "pw".into(),
        };
        let bare = inventory_envelope(&credentials, "PC54", None, None);
        assert!(!bare.contains("<shar:Filter>"));

        let filtered = inventory_envelope(&credentials, "PC54", Some("Navy"), Some("L"));
        assert!(filtered.contains("<shar:partColor>Navy</shar:partColor>"));
        assert!(filtered.contains("<shar:labelSize>L</shar:labelSize>"));
        assert!(filtered.contains("<shar:wsVersion>2.0.0</shar:wsVersion>"));
    }

    #[test]
    fn parses_locations_and_quantities() {
        let xml = r#"<S:Envelope xmlns:S="http://schemas.xmlsoap.org/soap/envelope/"><S:Body>
<ns2:GetInventoryLevelsResponse xmlns:ns2="http://www.promostandards.org/WSDL/Inventory/2.0.0/"
    xmlns:shar="http://www.promostandards.org/WSDL/Inventory/2.0.0/SharedObjects/">
  <shar:Inventory>
    <shar:PartInventoryArray>
      <shar:PartInventory>
        <shar:InventoryLocationArray>
          <shar:InventoryLocation>
            <shar:inventoryLocationId>Dallas</shar:inventoryLocationId>
            <shar:inventoryLocationQuantity>
              <shar:Quantity><shar:uom>EA</shar:uom><shar:value>240</shar:value></shar:Quantity>
            </shar:inventoryLocationQuantity>
          </shar:InventoryLocation>
          <shar:InventoryLocation>
            <shar:inventoryLocationId>Reno</shar:inventoryLocationId>
            <shar:inventoryLocationQuantity>
              <shar:Quantity><shar:uom>EA</shar:uom><shar:value>12</shar:value></shar:Quantity>
            </shar:inventoryLocationQuantity>
          </shar:InventoryLocation>
        </shar:InventoryLocationArray>
      </shar:PartInventory>
    </shar:PartInventoryArray>
  </shar:Inventory>
</ns2:GetInventoryLevelsResponse>
</S:Body></S:Envelope>"#;
        let levels = parse_inventory_levels(xml).unwrap();
        assert_eq!(
            levels,
            vec![
                InventoryLevel {
                    location: "Dallas".into(),
                    quantity: 240
                },
                InventoryLevel {
                    location: "Reno".into(),
                    quantity: 12
                },
            ]
        );
    }

    #[test]
    fn missing_location_id_is_skipped() {
        let xml = r#"<r><InventoryLocation><value>5</value></InventoryLocation></r>"#;
        assert!(parse_inventory_levels(xml).unwrap().is_empty());
    }
}
