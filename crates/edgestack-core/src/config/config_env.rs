//! Environment overrides applied on top of the config file.
//!
//! The variable names match the ones documented for the hosted installer.

use std::env;

use super::EnvOverrides;

pub const ENV_HELM_REPO: &str = "AES_HELM_REPO";
/// Version rule matched against the image tag a chart installs, e.g. `1.3.*`.
pub const ENV_CHART_VERSION_RULE: &str = "AES_CHART_VERSION";
pub const ENV_IMAGE_REPOSITORY: &str = "AES_IMAGE_REPOSITORY";
pub const ENV_IMAGE_TAG: &str = "AES_IMAGE_TAG";
pub const ENV_TELEMETRY_DISABLE: &str = "SCOUT_DISABLE";
pub const ENV_DEBUG: &str = "DEBUG";

pub(super) fn read_env_overrides() -> EnvOverrides {
    overrides_from(|key| env::var(key).ok())
}

pub(super) fn overrides_from(lookup: impl Fn(&str) -> Option<String>) -> EnvOverrides {
    let non_empty = |key: &str| {
        lookup(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };
    EnvOverrides {
        helm_repo: non_empty(ENV_HELM_REPO),
        chart_version_rule: non_empty(ENV_CHART_VERSION_RULE),
        image_repository: non_empty(ENV_IMAGE_REPOSITORY),
        image_tag: non_empty(ENV_IMAGE_TAG),
        telemetry_disabled: non_empty(ENV_TELEMETRY_DISABLE).is_some(),
        debug: non_empty(ENV_DEBUG).is_some(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn blank_values_are_ignored() {
        let overrides = overrides_from(lookup(&[
            (ENV_CHART_VERSION_RULE, "  "),
            (ENV_TELEMETRY_DISABLE, ""),
            (ENV_IMAGE_TAG, "1.4.0"),
        ]));
        assert_eq!(overrides.chart_version_rule, None);
        assert!(!overrides.telemetry_disabled);
        assert_eq!(overrides.image_tag.as_deref(), Some("1.4.0"));
    }

    #[test]
    fn any_non_empty_value_disables_telemetry() {
        let overrides = overrides_from(lookup(&[(ENV_TELEMETRY_DISABLE, "0")]));
        assert!(overrides.telemetry_disabled);
    }
}
