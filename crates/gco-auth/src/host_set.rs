//! Host-set resolution for aliasing and credential storage.

use std::collections::BTreeSet;

/// Hosts the current strategy must cover.
///
/// Always contains `primary_host`. The compatible list is folded in only
/// when it mentions the primary host itself; a list for some other backend
/// must not widen the rewrite surface of this checkout.
pub fn resolve(primary_host: &str, compatible_hosts: &[String]) -> BTreeSet<String> {
    let mut hosts = BTreeSet::new();
    hosts.insert(primary_host.to_string());
    if compatible_hosts.iter().any(|h| h == primary_host) {
        hosts.extend(compatible_hosts.iter().cloned());
    }
    hosts
}

/// `(protocol, host)` pairs for credential records covering the host set.
///
/// Both https and http are emitted per host so a stored credential matches
/// whichever protocol later fetches resolve to.
pub fn combinable(hosts: &BTreeSet<String>) -> Vec<(&'static str, String)> {
    let mut pairs = Vec::with_capacity(hosts.len() * 2);
    for host in hosts {
        pairs.push(("https", host.clone()));
        pairs.push(("http", host.clone()));
    }
    pairs
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn hosts(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_should_contain_primary_host_only_without_aliases() {
        let set = resolve("git.example.com", &[]);
        assert_eq!(set.len(), 1);
        assert!(set.contains("git.example.com"));
    }

    #[test]
    fn test_should_fold_in_compatible_hosts_when_primary_listed() {
        let set = resolve(
            "git.example.com",
            &hosts(&["git.example.com", "mirror.example.com"]),
        );
        assert_eq!(set.len(), 2);
        assert!(set.contains("mirror.example.com"));
    }

    #[test]
    fn test_should_ignore_compatible_hosts_for_unlisted_primary() {
        let set = resolve(
            "other.example.com",
            &hosts(&["git.example.com", "mirror.example.com"]),
        );
        assert_eq!(set.len(), 1);
        assert!(set.contains("other.example.com"));
    }

    #[test]
    fn test_should_emit_both_protocols_per_host() {
        let set = resolve("git.example.com", &[]);
        let pairs = combinable(&set);
        assert_eq!(
            pairs,
            vec![
                ("https", "git.example.com".to_string()),
                ("http", "git.example.com".to_string()),
            ]
        );
    }
}
