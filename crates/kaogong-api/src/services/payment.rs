//! Signing for the payment gateway's redirect and notify parameters.
//!
//! The signed string is every non-empty parameter except `sign` and
//! `sign_type`, sorted by key and joined as `k1=v1&k2=v2`. The signature is
//! the lowercase hex HMAC-SHA256 of that string keyed with the merchant key.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use kaogong_types::format_yuan;
use sha2::Sha256;
use thiserror::Error;

use kaogong_persist::Order;

use crate::config::PaymentConfig;

type HmacSha256 = Hmac<Sha256>;

pub const SIGN_TYPE: &str = "HMAC-SHA256";
pub const TRADE_SUCCESS: &str = "TRADE_SUCCESS";

fn signing_string<'a>(params: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let sorted: BTreeMap<&str, &str> = params
        .into_iter()
        .filter(|(k, v)| !v.is_empty() && *k != "sign" && *k != "sign_type")
        .collect();
    sorted
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("merchant key rejected by HMAC")]
    InvalidKey,

    #[error("invalid payment gateway URL: {0}")]
    GatewayUrl(#[from] url::ParseError),
}

fn mac(key: &str) -> Result<HmacSha256, PaymentError> {
    HmacSha256::new_from_slice(key.as_bytes()).map_err(|_| PaymentError::InvalidKey)
}

pub fn sign<'a>(
    params: impl IntoIterator<Item = (&'a str, &'a str)>,
    key: &str,
) -> Result<String, PaymentError> {
    let mut mac = mac(key)?;
    mac.update(signing_string(params).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of the `sign` parameter
pub fn verify(params: &HashMap<String, String>, key: &str) -> Result<bool, PaymentError> {
    let Some(signature) = params.get("sign").and_then(|s| hex::decode(s.trim()).ok()) else {
        return Ok(false);
    };
    let mut mac = mac(key)?;
    mac.update(signing_string(params.iter().map(|(k, v)| (k.as_str(), v.as_str()))).as_bytes());
    Ok(mac.verify_slice(&signature).is_ok())
}

/// Our order number: `KG` + UTC timestamp + 8 random hex chars
pub fn new_out_trade_no(now: DateTime<Utc>) -> String {
    let suffix: u32 = rand::random();
    format!("KG{}{:08x}", now.format("%Y%m%d%H%M%S"), suffix)
}

/// Gateway URL the learner is redirected to for paying `order`
pub fn pay_url(config: &PaymentConfig, key: &str, order: &Order) -> Result<String, PaymentError> {
    let money = format_yuan(order.amount_cents);
    let name = order.plan.title();
    let params = [
        ("pid", config.pid.as_str()),
        ("out_trade_no", order.out_trade_no.as_str()),
        ("name", name),
        ("money", money.as_str()),
        ("notify_url", config.notify_url.as_str()),
        ("return_url", config.return_url.as_str()),
    ];
    let signature = sign(params, key)?;

    let mut url = url::Url::parse(&config.gateway_url)?;
    url.query_pairs_mut()
        .extend_pairs(params)
        .append_pair("sign", &signature)
        .append_pair("sign_type", SIGN_TYPE);
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kaogong_types::MembershipPlan;

    fn notify_params(key: &str) -> HashMap<String, String> {
        let mut params: HashMap<String, String> = [
            ("pid", "1001"),
            ("trade_no", "T2026"),
            ("out_trade_no", "KG20260301120000abcdef01"),
            ("money", "29.90"),
            ("trade_status", TRADE_SUCCESS),
            ("param", ""),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let signature = sign(params.iter().map(|(k, v)| (k.as_str(), v.as_str())), key).unwrap();
        params.insert("sign".into(), signature);
        params.insert("sign_type".into(), SIGN_TYPE.into());
        params
    }

    #[test]
    fn test_signing_string_sorts_and_skips() {
        let s = signing_string([("b", "2"), ("sign", "x"), ("a", "1"), ("empty", ""), ("sign_type", "y")]);
        assert_eq!(s, "a=1&b=2");
    }

    #[test]
    fn test_verify_accepts_own_signature() {
        assert!(verify(&notify_params("merchant-key"), "merchant-key").unwrap());
    }

    #[test]
    fn test_verify_rejects_tampering() {
        let mut params = notify_params("merchant-key");
        params.insert("money".into(), "0.01".into());
        assert!(!verify(&params, "merchant-key").unwrap());

        assert!(!verify(&notify_params("other-key"), "merchant-key").unwrap());

        let mut unsigned = notify_params("merchant-key");
        unsigned.remove("sign");
        assert!(!verify(&unsigned, "merchant-key").unwrap());
    }

    #[test]
    fn test_empty_key_still_signs() {
        let signature = sign([("a", "1")], "").unwrap();
        assert_eq!(signature.len(), 64);
        let params: HashMap<String, String> =
            [("a".to_string(), "1".to_string()), ("sign".to_string(), signature)].into();
        assert!(verify(&params, "").unwrap());
    }

    #[test]
    fn test_out_trade_no_format() {
        let no = new_out_trade_no(Utc::now());
        assert!(no.starts_with("KG"));
        assert_eq!(no.len(), 2 + 14 + 8);
    }

    #[test]
    fn test_pay_url_carries_signed_params() {
        let config = PaymentConfig {
            gateway_url: "https://pay.example.com/submit.php".into(),
            pid: "1001".into(),
            notify_url: "https://api.example.com/payment/notify".into(),
            return_url: "https://app.example.com/".into(),
        };
        let order = Order::new("u1", MembershipPlan::Monthly, "KG20260301120000abcdef01");
        let url = url::Url::parse(&pay_url(&config, "k", &order).unwrap()).unwrap();
        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(query["money"], "29.90");
        assert_eq!(query["name"], "月度会员");
        assert_eq!(query["sign_type"], SIGN_TYPE);
        assert!(verify(&query, "k").unwrap());
    }
}
