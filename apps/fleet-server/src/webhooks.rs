use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use url::{Host, Url};

use crate::clock::Clock;
use fleet_topics as topics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DenyReason {
    Malformed,
    SchemeUnsupported,
    HostMissing,
    LoopbackHost,
    PrivateHost,
    PortNotAllowed,
}

pub(crate) fn reason_code(reason: DenyReason) -> &'static str {
    match reason {
        DenyReason::Malformed => "malformed",
        DenyReason::SchemeUnsupported => "scheme",
        DenyReason::HostMissing => "host_missing",
        DenyReason::LoopbackHost => "loopback",
        DenyReason::PrivateHost => "private_range",
        DenyReason::PortNotAllowed => "port",
    }
}

/// Literal-pattern SSRF screen for outbound webhook targets. No DNS
/// resolution happens here, so this guards against literal-address targets
/// only, not DNS rebinding.
pub(crate) fn validate_target_url(raw: &str) -> Result<Url, DenyReason> {
    let url = Url::parse(raw.trim()).map_err(|_| DenyReason::Malformed)?;
    match url.scheme() {
        "http" | "https" => {}
        _ => return Err(DenyReason::SchemeUnsupported),
    }
    match url.host() {
        None => return Err(DenyReason::HostMissing),
        Some(Host::Ipv4(addr)) => check_v4(addr)?,
        Some(Host::Ipv6(addr)) => check_v6(addr)?,
        Some(Host::Domain(domain)) => {
            // `url` normally yields the Ipv4 variant for dotted literals;
            // re-check in case a literal slips through as a domain.
            if let Ok(addr) = domain.parse::<Ipv4Addr>() {
                check_v4(addr)?;
            }
        }
    }
    if let Some(port) = url.port() {
        if !matches!(port, 80 | 443) {
            return Err(DenyReason::PortNotAllowed);
        }
    }
    Ok(url)
}

fn check_v4(addr: Ipv4Addr) -> Result<(), DenyReason> {
    if addr.is_loopback() {
        return Err(DenyReason::LoopbackHost);
    }
    if addr.is_private() || addr.is_link_local() || addr.is_unspecified() || addr.is_broadcast() {
        return Err(DenyReason::PrivateHost);
    }
    Ok(())
}

fn check_v6(addr: Ipv6Addr) -> Result<(), DenyReason> {
    if addr.is_loopback() {
        return Err(DenyReason::LoopbackHost);
    }
    if let Some(mapped) = addr.to_ipv4_mapped() {
        return check_v4(mapped);
    }
    let first = addr.segments()[0];
    // fc00::/7 unique-local, fe80::/10 link-local.
    if addr.is_unspecified() || (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80 {
        return Err(DenyReason::PrivateHost);
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct StoredSubscription {
    id: String,
    target_url: String,
    event_types: Vec<String>,
    #[allow(dead_code)] // held for delivery signing; not exposed in views
    secret: Option<String>,
    is_enabled: bool,
    created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SubscriptionView {
    pub id: String,
    pub target_url: String,
    pub event_types: Vec<String>,
    pub is_enabled: bool,
    pub created_at: String,
}

/// Screened outbound webhook subscriptions. Secrets are stored but never
/// echoed back in views.
pub(crate) struct WebhookRegistry {
    clock: Arc<dyn Clock>,
    bus: fleet_events::Bus,
    inner: Mutex<Vec<StoredSubscription>>,
}

impl WebhookRegistry {
    pub(crate) fn new(clock: Arc<dyn Clock>, bus: fleet_events::Bus) -> Self {
        Self {
            clock,
            bus,
            inner: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn subscribe(
        &self,
        target_url: &str,
        event_types: Vec<String>,
        secret: Option<String>,
        is_enabled: bool,
    ) -> Result<SubscriptionView, DenyReason> {
        let url = validate_target_url(target_url)?;
        let sub = StoredSubscription {
            id: uuid::Uuid::new_v4().to_string(),
            target_url: url.to_string(),
            event_types,
            secret,
            is_enabled,
            created_at: self.clock.now().to_rfc3339(),
        };
        let view = SubscriptionView {
            id: sub.id.clone(),
            target_url: sub.target_url.clone(),
            event_types: sub.event_types.clone(),
            is_enabled: sub.is_enabled,
            created_at: sub.created_at.clone(),
        };
        self.inner.lock().push(sub);
        self.bus.publish(
            topics::TOPIC_WEBHOOKS_SUBSCRIBED,
            &json!({"id": view.id, "target_url": view.target_url}),
        );
        Ok(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_and_private_literals_are_rejected() {
        for target in [
            "http://127.0.0.1:22/x",
            "https://127.0.0.1/",
            "https://[::1]/",
            "https://[::ffff:127.0.0.1]/",
        ] {
            let reason = validate_target_url(target).unwrap_err();
            assert_eq!(reason, DenyReason::LoopbackHost, "target {target}");
        }
        assert_eq!(
            validate_target_url("https://10.0.0.8/hook").unwrap_err(),
            DenyReason::PrivateHost
        );
        assert_eq!(
            validate_target_url("http://192.168.1.4/hook").unwrap_err(),
            DenyReason::PrivateHost
        );
        assert_eq!(
            validate_target_url("https://[fe80::1]/hook").unwrap_err(),
            DenyReason::PrivateHost
        );
        assert_eq!(
            validate_target_url("https://[fd12::2]/hook").unwrap_err(),
            DenyReason::PrivateHost
        );
    }

    #[test]
    fn disallowed_ports_and_schemes_are_rejected() {
        assert_eq!(
            validate_target_url("https://hooks.example.com:8443/x").unwrap_err(),
            DenyReason::PortNotAllowed
        );
        assert_eq!(
            validate_target_url("ftp://hooks.example.com/x").unwrap_err(),
            DenyReason::SchemeUnsupported
        );
        assert_eq!(
            validate_target_url("not a url").unwrap_err(),
            DenyReason::Malformed
        );
    }

    #[test]
    fn public_targets_pass_and_are_stored() {
        let registry = WebhookRegistry::new(
            Arc::new(crate::clock::test::ManualClock::epoch()),
            fleet_events::Bus::new(16),
        );
        let view = registry
            .subscribe(
                "https://hooks.example.com/fleet",
                vec!["hazards.updated".into()],
                Some("s3cret".into()),
                true,
            )
            .expect("subscribe");
        assert!(view.is_enabled);
        assert_eq!(view.target_url, "https://hooks.example.com/fleet");
        // The view must not leak the secret.
        let json = serde_json::to_value(&view).expect("serialize");
        assert!(json.get("secret").is_none());
    }
}
