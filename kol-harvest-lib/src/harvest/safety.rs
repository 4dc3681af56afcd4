//! Refusal to run collection from a production host.
//!
//! Collection must run from an operator machine; a production deployment that
//! starts hammering the gateway risks getting the whole service blocked.

use thiserror::Error;

/// Environment names treated as production.
const PRODUCTION_ENVIRONMENTS: &[&str] = &["production", "prod"];

/// What the gate knows about where it is running.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeContext {
    pub environment: Option<String>,
    pub hostname: Option<String>,
}

impl RuntimeContext {
    /// Build a context, falling back to the machine's own name when no
    /// hostname is given.
    #[must_use]
    pub fn new(environment: Option<String>, hostname: Option<String>) -> Self {
        Self {
            environment,
            hostname: hostname.or_else(local_hostname),
        }
    }
}

/// The operating system's name for this machine, if it can be read.
#[must_use]
pub fn local_hostname() -> Option<String> {
    hostname::get()
        .ok()
        .map(|h| h.to_string_lossy().into_owned())
        .filter(|h| !h.trim().is_empty())
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SafetyViolation {
    #[error("refusing to collect: environment '{0}' is production; run collection from an operator machine")]
    ProductionEnvironment(String),

    #[error("refusing to collect: host '{host}' belongs to production domain '{domain}'")]
    ProductionHost { host: String, domain: String },
}

/// Decides whether collection may start.
#[derive(Debug, Clone, Default)]
pub struct SafetyGate {
    production_domains: Vec<String>,
}

impl SafetyGate {
    #[must_use]
    pub fn new(production_domains: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            production_domains: production_domains
                .into_iter()
                .map(|d| d.into().trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    pub fn check(&self, context: &RuntimeContext) -> Result<(), SafetyViolation> {
        if let Some(env) = context.environment.as_deref().map(str::trim)
            && PRODUCTION_ENVIRONMENTS.iter().any(|p| env.eq_ignore_ascii_case(p))
        {
            return Err(SafetyViolation::ProductionEnvironment(env.to_string()));
        }

        if let Some(host) = context.hostname.as_deref().map(|h| h.trim().to_ascii_lowercase())
            && let Some(domain) = self.production_domains.iter().find(|d| host_in_domain(&host, d))
        {
            return Err(SafetyViolation::ProductionHost {
                host,
                domain: domain.clone(),
            });
        }

        Ok(())
    }
}

fn host_in_domain(host: &str, domain: &str) -> bool {
    host == domain || host.strip_suffix(domain).is_some_and(|prefix| prefix.ends_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(environment: Option<&str>, hostname: Option<&str>) -> RuntimeContext {
        RuntimeContext {
            environment: environment.map(Into::into),
            hostname: hostname.map(Into::into),
        }
    }

    #[test]
    fn test_production_environment_refused() {
        let gate = SafetyGate::default();
        for env in ["production", "PROD", " Production "] {
            let err = gate.check(&context(Some(env), None)).unwrap_err();
            assert!(matches!(err, SafetyViolation::ProductionEnvironment(_)), "{env}");
        }
    }

    #[test]
    fn test_other_environments_allowed() {
        let gate = SafetyGate::default();
        for env in ["development", "staging", "", "producer"] {
            gate.check(&context(Some(env), None)).unwrap();
        }
        gate.check(&RuntimeContext::default()).unwrap();
    }

    #[test]
    fn test_production_host_refused() {
        let gate = SafetyGate::new(["example.app", ".Deploy.Example.com"]);

        let err = gate.check(&context(None, Some("web-1.example.app"))).unwrap_err();
        assert_eq!(
            err,
            SafetyViolation::ProductionHost {
                host: "web-1.example.app".into(),
                domain: "example.app".into(),
            }
        );

        let _ = gate.check(&context(None, Some("EXAMPLE.APP"))).unwrap_err();
        let _ = gate.check(&context(None, Some("api.deploy.example.com"))).unwrap_err();
    }

    #[test]
    fn test_lookalike_hosts_allowed() {
        let gate = SafetyGate::new(["example.app"]);
        gate.check(&context(None, Some("notexample.app"))).unwrap();
        gate.check(&context(None, Some("laptop.local"))).unwrap();
    }

    #[test]
    fn test_explicit_hostname_wins_over_local_name() {
        let context = RuntimeContext::new(None, Some("laptop.local".into()));
        assert_eq!(context.hostname.as_deref(), Some("laptop.local"));
    }

    #[test]
    fn test_missing_hostname_falls_back_to_local_name() {
        let context = RuntimeContext::new(Some("development".into()), None);
        assert_eq!(context.hostname, local_hostname());
        assert_eq!(context.environment.as_deref(), Some("development"));
    }

    #[test]
    fn test_local_name_matched_against_production_domains() {
        let Some(local) = local_hostname() else {
            return;
        };

        let gate = SafetyGate::new([local.clone()]);
        let err = gate.check(&RuntimeContext::new(None, None)).unwrap_err();
        assert!(matches!(err, SafetyViolation::ProductionHost { .. }), "{err}");
    }

    #[test]
    fn test_environment_checked_before_host() {
        let gate = SafetyGate::new(["example.app"]);
        let err = gate.check(&context(Some("prod"), Some("a.example.app"))).unwrap_err();
        assert!(matches!(err, SafetyViolation::ProductionEnvironment(_)));
    }
}
