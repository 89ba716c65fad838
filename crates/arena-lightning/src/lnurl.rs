//! LNURL-pay resolution and LNURL encoding.
//!
//! Payouts go to Lightning addresses (`name@domain`). The address
//! resolves to a well-known pay endpoint whose callback mints the actual
//! bolt11 invoice. Resolution talks to third-party servers, so it runs
//! under its own (shorter) deadline and every failure is classified:
//! malformed address or out-of-range amount is `InvalidAddress`, network
//! trouble is `Transient`.

use bech32::{Bech32, Hrp};
use serde::Deserialize;

use crate::client::LnbitsClient;
use crate::error::{LightningError, Result};

#[derive(Debug, Deserialize)]
struct PayEndpoint {
    callback: String,
    #[serde(rename = "minSendable")]
    min_sendable: u64,
    #[serde(rename = "maxSendable")]
    max_sendable: u64,
    #[serde(default)]
    tag: String,
}

#[derive(Debug, Deserialize)]
struct CallbackResponse {
    pr: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// Split and validate a Lightning address.
pub fn parse_lightning_address(address: &str) -> Result<(String, String)> {
    let trimmed = address.trim();
    let (name, domain) = trimmed
        .split_once('@')
        .ok_or_else(|| LightningError::InvalidAddress(format!("not name@domain: {}", trimmed)))?;

    let name_ok = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'_'));
    let domain_ok = !domain.is_empty()
        && domain.contains('.')
        && domain
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-'));

    if !name_ok || !domain_ok {
        return Err(LightningError::InvalidAddress(format!(
            "malformed address: {}",
            trimmed
        )));
    }
    Ok((name.to_string(), domain.to_string()))
}

/// Well-known pay endpoint for a Lightning address.
pub fn pay_endpoint_url(name: &str, domain: &str) -> String {
    format!("https://{}/.well-known/lnurlp/{}", domain, name)
}

/// Encode a URL as a bech32 LNURL (for QR presentation).
pub fn encode_lnurl(url: &str) -> Result<String> {
    let hrp = Hrp::parse("lnurl").map_err(|e| LightningError::Protocol(e.to_string()))?;
    bech32::encode::<Bech32>(hrp, url.as_bytes())
        .map(|s| s.to_uppercase())
        .map_err(|e| LightningError::Protocol(e.to_string()))
}

/// Resolve a Lightning address and fetch a bolt11 invoice for
/// `amount_sats` from its callback.
pub(crate) async fn fetch_invoice_for_address(
    client: &LnbitsClient,
    address: &str,
    amount_sats: i64,
    memo: &str,
) -> Result<String> {
    let (name, domain) = parse_lightning_address(address)?;
    let endpoint_url = pay_endpoint_url(&name, &domain);
    let deadline = client.lnurl_timeout();

    let endpoint: PayEndpoint = tokio::time::timeout(deadline, async {
        let response = client
            .http()
            .get(&endpoint_url)
            .send()
            .await
            .map_err(|e| LightningError::Transient(e.to_string()))?;
        if !response.status().is_success() {
            return Err(LightningError::InvalidAddress(format!(
                "pay endpoint returned {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| LightningError::InvalidAddress(format!("bad pay metadata: {}", e)))
    })
    .await
    .map_err(|_| LightningError::Transient("lnurl-pay resolution timed out".into()))??;

    if !endpoint.tag.is_empty() && endpoint.tag != "payRequest" {
        return Err(LightningError::InvalidAddress(format!(
            "unexpected LNURL tag: {}",
            endpoint.tag
        )));
    }

    let amount_msat = (amount_sats as u64) * 1000;
    if amount_msat < endpoint.min_sendable || amount_msat > endpoint.max_sendable {
        return Err(LightningError::InvalidAddress(format!(
            "amount {} msat outside sendable range [{}, {}]",
            amount_msat, endpoint.min_sendable, endpoint.max_sendable
        )));
    }

    let separator = if endpoint.callback.contains('?') { '&' } else { '?' };
    let callback_url = format!(
        "{}{}amount={}&comment={}",
        endpoint.callback,
        separator,
        amount_msat,
        urlencode(memo)
    );

    let callback: CallbackResponse = tokio::time::timeout(deadline, async {
        let response = client
            .http()
            .get(&callback_url)
            .send()
            .await
            .map_err(|e| LightningError::Transient(e.to_string()))?;
        if !response.status().is_success() {
            return Err(LightningError::PaymentFailed(format!(
                "lnurl callback returned {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| LightningError::PaymentFailed(format!("bad callback response: {}", e)))
    })
    .await
    .map_err(|_| LightningError::Transient("lnurl-pay callback timed out".into()))??;

    callback.pr.ok_or_else(|| {
        LightningError::PaymentFailed(format!(
            "callback returned no invoice: {}",
            callback.reason.unwrap_or_default()
        ))
    })
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_addresses() {
        let (name, domain) = parse_lightning_address("alice@ln.example.com").unwrap();
        assert_eq!(name, "alice");
        assert_eq!(domain, "ln.example.com");

        assert!(parse_lightning_address("bob.smith_01@wallet.example").is_ok());
    }

    #[test]
    fn parse_rejects_malformed_addresses() {
        for bad in [
            "",
            "alice",
            "@example.com",
            "alice@",
            "alice@nodot",
            "Alice@example.com",
            "al ice@example.com",
            "alice@exa mple.com",
        ] {
            let err = parse_lightning_address(bad).unwrap_err();
            assert!(
                matches!(err, LightningError::InvalidAddress(_)),
                "expected InvalidAddress for {:?}",
                bad
            );
        }
    }

    #[test]
    fn pay_endpoint_url_shape() {
        assert_eq!(
            pay_endpoint_url("alice", "ln.example.com"),
            "https://ln.example.com/.well-known/lnurlp/alice"
        );
    }

    #[test]
    fn lnurl_encoding_is_bech32() {
        let encoded = encode_lnurl("https://arena.example/lnurl-auth?tag=login&k1=00").unwrap();
        assert!(encoded.starts_with("LNURL1"));
        // bech32 alphabet only after the separator.
        assert!(encoded[6..]
            .bytes()
            .all(|b| b"QPZRY9X8GF2TVDW0S3JN54KHCE6MUA7L".contains(&b)));
    }

    #[test]
    fn urlencode_escapes_reserved() {
        assert_eq!(urlencode("Place 1 Prize"), "Place%201%20Prize");
        assert_eq!(urlencode("a&b=c"), "a%26b%3Dc");
    }
}
