//! Client network-quality signals.
//!
//! Sourced from Network Information client hints (`ECT`, `Downlink`, `RTT`,
//! `Save-Data`) or from the `grid_aware_connection` cookie the browser-side
//! detector writes.

use serde::{Deserialize, Serialize};

pub const COOKIE_NAME: &str = "grid_aware_connection";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// `4g`, `3g`, `2g` or `slow-2g`.
    pub effective_type: String,
    pub downlink_mbps: Option<f64>,
    pub rtt_ms: Option<u32>,
    pub save_data: bool,
}

impl Default for ConnectionInfo {
    fn default() -> Self {
        Self {
            effective_type: "4g".into(),
            downlink_mbps: Some(10.0),
            rtt_ms: Some(100),
            save_data: false,
        }
    }
}

/// Cookie payload written by the client-side detector.
#[derive(Deserialize)]
struct CookiePayload {
    effective_type: Option<String>,
    downlink: Option<f64>,
    rtt: Option<f64>,
    save_data: Option<bool>,
}

impl ConnectionInfo {
    /// Read client hint headers. Header names are case-insensitive.
    /// Returns `None` unless an `ECT` hint is present.
    pub fn from_client_hints<'a, I>(headers: I) -> Option<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut ect = None;
        let mut downlink = None;
        let mut rtt = None;
        let mut save_data = false;

        for (name, value) in headers {
            let value = value.trim();
            match name.to_ascii_lowercase().as_str() {
                "ect" => ect = Some(value.to_ascii_lowercase()),
                "downlink" => downlink = value.parse::<f64>().ok(),
                "rtt" => rtt = value.parse::<u32>().ok(),
                "save-data" => save_data = value.eq_ignore_ascii_case("on"),
                _ => {}
            }
        }

        ect.map(|effective_type| Self {
            effective_type,
            downlink_mbps: downlink,
            rtt_ms: rtt,
            save_data,
        })
    }

    /// Parse the detector cookie. Missing fields take the defaults.
    pub fn from_cookie(json: &str) -> Option<Self> {
        let payload: CookiePayload = match serde_json::from_str(json) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring malformed connection cookie");
                return None;
            }
        };
        let d = Self::default();
        Some(Self {
            effective_type: payload
                .effective_type
                .map(|t| t.to_ascii_lowercase())
                .unwrap_or(d.effective_type),
            downlink_mbps: payload.downlink.or(d.downlink_mbps),
            rtt_ms: payload.rtt.map(|r| r.max(0.0).round() as u32).or(d.rtt_ms),
            save_data: payload.save_data.unwrap_or(d.save_data),
        })
    }

    /// Client hints first, then the cookie, then defaults.
    pub fn detect<'a, I>(headers: I, cookie: Option<&str>) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        Self::from_client_hints(headers)
            .or_else(|| cookie.and_then(Self::from_cookie))
            .unwrap_or_default()
    }

    pub fn is_constrained(&self) -> bool {
        self.save_data || matches!(self.effective_type.as_str(), "slow-2g" | "2g")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hints_are_case_insensitive() {
        let info = ConnectionInfo::from_client_hints([
            ("ECT", "3G"),
            ("downlink", "1.45"),
            ("Rtt", "300"),
            ("save-data", "on"),
        ])
        .unwrap();
        assert_eq!(info.effective_type, "3g");
        assert_eq!(info.downlink_mbps, Some(1.45));
        assert_eq!(info.rtt_ms, Some(300));
        assert!(info.save_data);
    }

    #[test]
    fn no_ect_no_hints() {
        assert!(ConnectionInfo::from_client_hints([("Downlink", "10")]).is_none());
    }

    #[test]
    fn garbage_hint_values_are_dropped() {
        let info = ConnectionInfo::from_client_hints([("ECT", "4g"), ("Downlink", "fast")]).unwrap();
        assert!(info.downlink_mbps.is_none());
        assert!(!info.save_data);
    }

    #[test]
    fn cookie_payload() {
        let info = ConnectionInfo::from_cookie(
            r#"{"effective_type":"2g","downlink":0.4,"rtt":1800,"save_data":false,"timestamp":1700000000000}"#,
        )
        .unwrap();
        assert_eq!(info.effective_type, "2g");
        assert_eq!(info.downlink_mbps, Some(0.4));
        assert_eq!(info.rtt_ms, Some(1800));
        assert!(info.is_constrained());
    }

    #[test]
    fn partial_cookie_uses_defaults() {
        let info = ConnectionInfo::from_cookie(r#"{"save_data":true}"#).unwrap();
        assert_eq!(info.effective_type, "4g");
        assert_eq!(info.downlink_mbps, Some(10.0));
        assert!(info.save_data);
    }

    #[test]
    fn malformed_cookie_is_none() {
        assert!(ConnectionInfo::from_cookie("4g").is_none());
    }

    #[test]
    fn detect_prefers_hints() {
        let cookie = r#"{"effective_type":"2g"}"#;
        let info = ConnectionInfo::detect([("ECT", "4g")], Some(cookie));
        assert_eq!(info.effective_type, "4g");

        let info = ConnectionInfo::detect(std::iter::empty::<(&str, &str)>(), Some(cookie));
        assert_eq!(info.effective_type, "2g");

        let info = ConnectionInfo::detect(std::iter::empty::<(&str, &str)>(), None);
        assert_eq!(info, ConnectionInfo::default());
    }
}
