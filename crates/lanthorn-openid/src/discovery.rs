//! Discovery documents (XRDS and HTML) and content negotiation

use lanthorn_core::OPENID_AX_NS;

use crate::config::ProviderConfig;

pub const XRDS_CONTENT_TYPE: &str = "application/xrds+xml";
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Representation chosen for a discovery response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryFormat {
    Xrds,
    Html,
}

impl DiscoveryFormat {
    fn media_type(&self) -> &'static str {
        match self {
            DiscoveryFormat::Xrds => "application/xrds+xml",
            DiscoveryFormat::Html => "text/html",
        }
    }
}

/// A rendered discovery document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryDocument {
    pub content_type: &'static str,
    pub body: String,
}

impl DiscoveryDocument {
    /// Render discovery for the provider, or for one user when `identity` is set
    pub fn render(config: &ProviderConfig, format: DiscoveryFormat, identity: Option<&str>) -> Self {
        match format {
            DiscoveryFormat::Xrds => Self {
                content_type: XRDS_CONTENT_TYPE,
                body: xrds(config, identity),
            },
            DiscoveryFormat::Html => Self {
                content_type: HTML_CONTENT_TYPE,
                body: html(config, identity),
            },
        }
    }
}

fn xrds(config: &ProviderConfig, identity: Option<&str>) -> String {
    let (service, local_id) = match identity {
        Some(id) => (
            "signon",
            format!("<LocalID>{}</LocalID>\n", escape(&config.identity_url(id))),
        ),
        None => ("server", String::new()),
    };

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<xrds:XRDS xmlns:xrds="xri://$xrds" xmlns="xri://$xrd*($v*2.0)">
<XRD>
<Service priority="0">
<Type>http://specs.openid.net/auth/2.0/{service}</Type>
<Type>{ax}</Type>
<URI>{endpoint}</URI>
{local_id}</Service>
</XRD>
</xrds:XRDS>
"#,
        service = service,
        ax = OPENID_AX_NS,
        endpoint = escape(&config.provider_endpoint),
        local_id = local_id,
    )
}

fn html(config: &ProviderConfig, identity: Option<&str>) -> String {
    let local_id = identity
        .map(|id| {
            format!(
                "<link rel=\"openid2.local_id\" href=\"{}\">\n",
                escape(&config.identity_url(id))
            )
        })
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<title>OpenID Provider</title>
<link rel="openid2.provider" href="{endpoint}">
{local_id}</head>
<body>
</body>
</html>
"#,
        endpoint = escape(&config.provider_endpoint),
        local_id = local_id,
    )
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Pick a representation from an `Accept` header.
///
/// XRDS wins ties. A missing or empty header accepts anything. Returns
/// `None` when neither representation is acceptable.
pub fn negotiate(accept: Option<&str>) -> Option<DiscoveryFormat> {
    let accept = match accept.map(str::trim) {
        None | Some("") => return Some(DiscoveryFormat::Xrds),
        Some(a) => a,
    };

    let ranges: Vec<(String, f32)> = accept.split(',').filter_map(parse_media_range).collect();

    let mut best: Option<(DiscoveryFormat, f32)> = None;
    for format in [DiscoveryFormat::Xrds, DiscoveryFormat::Html] {
        let q = quality(&ranges, format.media_type());
        if q > 0.0 && best.map_or(true, |(_, b)| q > b) {
            best = Some((format, q));
        }
    }
    best.map(|(format, _)| format)
}

fn parse_media_range(range: &str) -> Option<(String, f32)> {
    let mut parts = range.split(';');
    let media = parts.next()?.trim().to_ascii_lowercase();
    if media.is_empty() {
        return None;
    }

    let q = parts
        .filter_map(|p| p.trim().strip_prefix("q="))
        .find_map(|q| q.trim().parse::<f32>().ok())
        .unwrap_or(1.0);
    Some((media, q))
}

/// Quality of `media_type` under the most specific matching range
fn quality(ranges: &[(String, f32)], media_type: &str) -> f32 {
    let main_type = media_type.split('/').next().unwrap_or_default();
    let mut best: Option<(u8, f32)> = None;

    for (range, q) in ranges {
        let specificity = if range == media_type {
            2
        } else if range.strip_suffix("/*") == Some(main_type) {
            1
        } else if range == "*/*" {
            0
        } else {
            continue;
        };

        if best.map_or(true, |(s, _)| specificity > s) {
            best = Some((specificity, *q));
        }
    }

    best.map(|(_, q)| q).unwrap_or(0.0)
}
