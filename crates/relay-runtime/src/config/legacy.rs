//! Canonical names for legacy configuration keys.
//!
//! Older deployment files use `lambdaCommand`, `lambdaTitle`, `addit`,
//! `apiKey`, `url` and `usetls`. figment merges layers by key name, so a legacy key in
//! a file and its canonical spelling in the environment would otherwise end
//! up as two entries for the same field. Every file and environment source is
//! wrapped in [`CanonicalKeys`] so all layers agree on one spelling before
//! they are merged.

use figment::value::{Dict, Map, Value};
use figment::{Error, Metadata, Profile, Provider};

/// Top-level renames. Lower-case forms cover environment variables.
const ROOT_KEYS: &[(&str, &str)] = &[
    ("lambdaCommand", "command_endpoint"),
    ("lambdacommand", "command_endpoint"),
    ("lambdaTitle", "link_endpoint"),
    ("lambdatitle", "link_endpoint"),
    ("addit", "quote_endpoint"),
];

/// Renames inside each endpoint table.
const ENDPOINT_KEYS: &[(&str, &str)] = &[
    ("apiKey", "api_key"),
    ("apikey", "api_key"),
    ("url", "endpoint"),
];

/// Renames inside each `networks.<name>` table.
const NETWORK_KEYS: &[(&str, &str)] = &[("usetls", "use_tls")];

/// Wraps a provider and rewrites legacy keys in its data to canonical names.
#[derive(Debug, Clone)]
pub struct CanonicalKeys<P>(pub P);

impl<P: Provider> Provider for CanonicalKeys<P> {
    fn metadata(&self) -> Metadata {
        self.0.metadata()
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut data = self.0.data()?;
        for dict in data.values_mut() {
            canonicalize(dict);
        }
        Ok(data)
    }

    fn profile(&self) -> Option<Profile> {
        self.0.profile()
    }
}

/// Rewrites legacy keys in one configuration tree.
pub fn canonicalize(root: &mut Dict) {
    rename(root, ROOT_KEYS);

    for key in ["command_endpoint", "link_endpoint", "quote_endpoint"] {
        if let Some(Value::Dict(_, endpoint)) = root.get_mut(key) {
            rename(endpoint, ENDPOINT_KEYS);
        }
    }

    if let Some(Value::Dict(_, networks)) = root.get_mut("networks") {
        for network in networks.values_mut() {
            if let Value::Dict(_, network) = network {
                rename(network, NETWORK_KEYS);
            }
        }
    }
}

/// Moves each legacy key to its canonical name. A canonical key already
/// present in the same source is kept.
fn rename(dict: &mut Dict, table: &[(&str, &str)]) {
    for (legacy, canonical) in table {
        if let Some(value) = dict.remove(*legacy) {
            dict.entry((*canonical).to_string()).or_insert(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::providers::Serialized;

    fn dict(value: serde_json::Value) -> Dict {
        match Serialized::defaults(value).data().unwrap().remove(&Profile::Default) {
            Some(dict) => dict,
            None => panic!("no default profile"),
        }
    }

    #[test]
    fn test_legacy_keys_are_renamed() {
        let mut root = dict(serde_json::json!({
            "lambdaCommand": { "url": "https://backend.example/c", "apiKey": "k1" },
            "lambdatitle": { "apikey": "k2" },
            "addit": { "url": "https://quotes.example/api" },
            "networks": { "libera": { "usetls": true, "server": "irc.libera.chat" } }
        }));
        canonicalize(&mut root);

        let keys: Vec<_> = root.keys().cloned().collect();
        assert_eq!(
            keys,
            vec!["command_endpoint", "link_endpoint", "networks", "quote_endpoint"]
        );

        let Some(Value::Dict(_, command)) = root.get("command_endpoint") else {
            panic!("command_endpoint is not a table");
        };
        assert!(command.contains_key("endpoint"));
        assert!(command.contains_key("api_key"));

        let Some(Value::Dict(_, quote)) = root.get("quote_endpoint") else {
            panic!("quote_endpoint is not a table");
        };
        assert!(quote.contains_key("endpoint"));
        assert!(!quote.contains_key("url"));

        let Some(Value::Dict(_, networks)) = root.get("networks") else {
            panic!("networks is not a table");
        };
        let Some(Value::Dict(_, libera)) = networks.get("libera") else {
            panic!("libera is not a table");
        };
        assert!(libera.contains_key("use_tls"));
        assert!(!libera.contains_key("usetls"));
    }

    #[test]
    fn test_canonical_key_in_same_source_wins() {
        let mut root = dict(serde_json::json!({
            "networks": { "libera": { "usetls": true, "use_tls": false } }
        }));
        canonicalize(&mut root);

        let Some(Value::Dict(_, networks)) = root.get("networks") else {
            panic!("networks is not a table");
        };
        let Some(Value::Dict(_, libera)) = networks.get("libera") else {
            panic!("libera is not a table");
        };
        assert_eq!(libera.len(), 1);
        assert_eq!(libera.get("use_tls").and_then(Value::to_bool), Some(false));
    }
}
