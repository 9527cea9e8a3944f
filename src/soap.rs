//! SOAP catalog clients for the supplier ProductData services.
//!
//! Request envelopes are fixed templates parameterized by credentials and
//! product id; per-supplier variation is confined to the namespace URIs and
//! wsVersion carried by the [`SupplierProfile`](crate::supplier::SupplierProfile).

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use roxmltree::Document;

use crate::normalizer::has_product_element;
use crate::supplier::{Ns, SupplierProfile};

/// Capability seam over a supplier catalog: enumerate sellable ids and fetch
/// raw detail XML per id.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Returns the set of currently sellable product ids.
    async fn list_sellable_ids(&self) -> Result<HashSet<String>>;

    /// Fetches the raw detail response for one product id.
    ///
    /// `None` means "no data for this id" (non-200 response, unparseable
    /// body, or no product element); the condition is logged by the
    /// implementation and is not pipeline-fatal.
    async fn fetch_detail(&self, product_id: &str) -> Option<String>;
}

/// Errors from catalog listing calls.
#[derive(Debug)]
pub enum SoapError {
    /// The endpoint answered with a non-200 status.
    Status(StatusCode),
    /// The request itself failed (connect, timeout, body).
    Http(reqwest::Error),
    /// The response body was empty or not well-formed XML.
    MalformedRoot(roxmltree::Error),
}

impl fmt::Display for SoapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(status) => write!(f, "SOAP endpoint returned {status}"),
            Self::Http(err) => write!(f, "SOAP request failed: {err}"),
            Self::MalformedRoot(err) => write!(f, "malformed SOAP response root: {err}"),
        }
    }
}

impl std::error::Error for SoapError {}

impl From<reqwest::Error> for SoapError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err)
    }
}

/// Credentials presented in every supplier request envelope.
#[derive(Clone)]
pub struct SoapCredentials {
    /// Account identifier.
    pub id: String,
    /// Account password.
    pub password: String,
}

impl fmt::Debug for SoapCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoapCredentials")
            .field("id", &self.id)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// HTTP client for one supplier's ProductData SOAP endpoint.
pub struct SoapClient {
    http: reqwest::Client,
    endpoint: String,
    profile: &'static SupplierProfile,
    credentials: SoapCredentials,
}

impl SoapClient {
    /// Builds a client bound to one supplier endpoint.
    pub fn new(
        endpoint: String,
        profile: &'static SupplierProfile,
        credentials: SoapCredentials,
        timeout: Duration,
    ) -> Result<Self> {
        anyhow::ensure!(
            endpoint.starts_with("http://") || endpoint.starts_with("https://"),
            "SOAP endpoint must be an http(s) URL"
        );
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| anyhow::Error::new(err).context("failed to build SOAP HTTP client"))?;
        Ok(Self {
            http,
            endpoint,
            profile,
            credentials,
        })
    }

    /// The profile this client was built for.
    pub fn profile(&self) -> &'static SupplierProfile {
        self.profile
    }

    async fn post_envelope(&self, url: &str, envelope: String) -> Result<String, SoapError> {
        let response = self
            .http
            .post(url)
            .header("Content-Type", "text/xml")
            .body(envelope)
            .send()
            .await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(SoapError::Status(status));
        }
        Ok(response.text().await?)
    }

    fn sellable_envelope(&self) -> String {
        envelope(
            self.profile,
            format!(
                "<ns:GetProductSellableRequest>\
                    {}\
                    <shar:isSellable>true</shar:isSellable>\
                </ns:GetProductSellableRequest>",
                self.credential_block()
            ),
        )
    }

    fn detail_envelope(&self, product_id: &str) -> String {
        envelope(
            self.profile,
            format!(
                "<ns:GetProductRequest>\
                    {}\
                    <shar:localizationCountry>US</shar:localizationCountry>\
                    <shar:localizationLanguage>en</shar:localizationLanguage>\
                    <shar:productId>{}</shar:productId>\
                </ns:GetProductRequest>",
                self.credential_block(),
                xml_escape(product_id)
            ),
        )
    }

    fn credential_block(&self) -> String {
        format!(
            "<shar:wsVersion>{}</shar:wsVersion>\
             <shar:id>{}</shar:id>\
             <shar:password>{}</shar:password>",
            self.profile.ws_version,
            xml_escape(&self.credentials.id),
            xml_escape(&self.credentials.password)
        )
    }
}

#[async_trait]
impl ProductCatalog for SoapClient {
    async fn list_sellable_ids(&self) -> Result<HashSet<String>> {
        // The sellable listing is served off the WSDL-suffixed URL upstream.
        let url = format!("{}?WSDL", self.endpoint);
        let body = self.post_envelope(&url, self.sellable_envelope()).await?;
        let doc = Document::parse(&body).map_err(SoapError::MalformedRoot)?;

        let service_ns = self.profile.ns_uri(Ns::Service);
        let shared_ns = self.profile.ns_uri(Ns::Shared);
        let mut ids = HashSet::new();
        for sellable in doc.descendants().filter(|node| {
            node.is_element()
                && node.tag_name().name() == "ProductSellable"
                && node.tag_name().namespace() == Some(service_ns)
        }) {
            let id = sellable
                .descendants()
                .find(|node| {
                    node.is_element()
                        && node.tag_name().name() == "productId"
                        && node.tag_name().namespace() == Some(shared_ns)
                })
                .and_then(|node| node.text())
                .map(str::trim)
                .filter(|text| !text.is_empty());
            if let Some(id) = id {
                ids.insert(id.to_string());
            }
        }
        Ok(ids)
    }

    async fn fetch_detail(&self, product_id: &str) -> Option<String> {
        let envelope = self.detail_envelope(product_id);
        let body = match self.post_envelope(&self.endpoint, envelope).await {
            Ok(body) => body,
            Err(err) => {
                eprintln!(
                    "{}: detail fetch failed for {product_id}: {err}",
                    self.profile.supplier.label()
                );
                return None;
            }
        };
        if !has_product_element(&body, self.profile) {
            eprintln!(
                "{}: no product element in detail response for {product_id}",
                self.profile.supplier.label()
            );
            return None;
        }
        Some(body)
    }
}

/// Escapes text for safe interpolation into an XML envelope.
pub fn xml_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

fn envelope(profile: &SupplierProfile, body: String) -> String {
    format!(
        r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" xmlns:ns="{}" xmlns:shar="{}"><soapenv:Header/><soapenv:Body>{}</soapenv:Body></soapenv:Envelope>"#,
        profile.service_ns, profile.shared_ns, body
    )
}
