//! Signature tables for mining protocols, software, hostnames and pools

/// Lowercase substrings that mark a response as stratum
pub const STRATUM_KEYWORDS: &[&str] = &["mining", "subscribe", "authorize", "difficulty", "target"];

/// Lowercase needle and display name of known mining software.
///
/// Names that contain another entry come first (`bfgminer` before `gminer`,
/// `srbminer` before `bminer`), so the most specific match wins.
pub const MINING_SOFTWARE: &[(&str, &str)] = &[
    ("xmr-stak", "XMR-Stak"),
    ("xmrig", "XMRig"),
    ("claymore", "Claymore"),
    ("phoenixminer", "PhoenixMiner"),
    ("teamredminer", "TeamRedMiner"),
    ("bfgminer", "BFGMiner"),
    ("cgminer", "CGMiner"),
    ("sgminer", "SGMiner"),
    ("gminer", "GMiner"),
    ("srbminer", "SRBMiner"),
    ("nbminer", "NBMiner"),
    ("bminer", "Bminer"),
    ("cpuminer", "cpuminer"),
    ("ccminer", "ccminer"),
    ("ethminer", "ethminer"),
    ("nanominer", "nanominer"),
    ("lolminer", "lolMiner"),
    ("miniz", "miniZ"),
    ("t-rex", "T-Rex"),
    ("z-enemy", "Z-Enemy"),
    ("wildrig", "WildRig"),
];

/// Hostname fragments typical of mining rigs
pub const HOSTNAME_KEYWORDS: &[&str] = &["miner", "mining", "asic", "antminer", "whatsminer"];

/// Domains of public mining pools
pub const POOL_DOMAINS: &[&str] = &[
    "nanopool.org",
    "ethermine.org",
    "f2pool.com",
    "antpool.com",
    "slushpool.com",
    "minergate.com",
    "supportxmr.com",
    "miningpoolhub.com",
    "nicehash.com",
    "poolin.com",
    "viabtc.com",
];

/// Does the response speak stratum?
pub fn is_stratum_response(response: &str) -> bool {
    let lower = response.to_lowercase();
    STRATUM_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}

/// Display name of the first mining software named in `response`
pub fn match_mining_software(response: &str) -> Option<&'static str> {
    let lower = response.to_lowercase();
    MINING_SOFTWARE
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, name)| *name)
}

/// First rig keyword found in `hostname`
pub fn match_hostname_keyword(hostname: &str) -> Option<&'static str> {
    let lower = hostname.to_lowercase();
    HOSTNAME_KEYWORDS
        .iter()
        .find(|keyword| lower.contains(*keyword))
        .copied()
}

/// Pool domain `hostname` belongs to (exact or subdomain match)
pub fn match_pool_domain(hostname: &str) -> Option<&'static str> {
    let lower = hostname.trim_end_matches('.').to_lowercase();
    POOL_DOMAINS
        .iter()
        .find(|domain| {
            lower == **domain
                || lower
                    .strip_suffix(*domain)
                    .map_or(false, |prefix| prefix.ends_with('.'))
        })
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stratum_keywords() {
        assert!(is_stratum_response(r#"{"id":1,"result":[["mining.notify","ae6812eb4cd7735a302a8a9dd95cf71f"]]}"#));
        assert!(is_stratum_response(r#"{"method":"mining.set_DIFFICULTY","params":[16]}"#));
        assert!(!is_stratum_response("HTTP/1.1 400 Bad Request\r\n\r\n"));
        assert!(!is_stratum_response(""));
    }

    #[test]
    fn test_specific_software_wins() {
        assert_eq!(match_mining_software("bfgminer 5.5.0"), Some("BFGMiner"));
        assert_eq!(match_mining_software("CGMiner/4.11"), Some("CGMiner"));
        assert_eq!(match_mining_software("gminer 3.44"), Some("GMiner"));
        assert_eq!(match_mining_software("NBMiner v42"), Some("NBMiner"));
        assert_eq!(match_mining_software("SRBMiner-MULTI"), Some("SRBMiner"));
        assert_eq!(match_mining_software("bminer 16.4"), Some("Bminer"));
        assert_eq!(match_mining_software(r#"{"agent":"XMRig/6.21.0"}"#), Some("XMRig"));
        assert_eq!(match_mining_software("nginx"), None);
    }

    #[test]
    fn test_every_needle_is_reachable() {
        for (needle, name) in MINING_SOFTWARE {
            assert_eq!(match_mining_software(needle), Some(*name), "{} shadowed", needle);
        }
    }

    #[test]
    fn test_hostname_keywords() {
        assert_eq!(match_hostname_keyword("Antminer-S19.lan"), Some("miner"));
        assert_eq!(match_hostname_keyword("asic-rack-2"), Some("asic"));
        assert_eq!(match_hostname_keyword("printer.office"), None);
    }

    #[test]
    fn test_pool_domains() {
        assert_eq!(match_pool_domain("eu1.nanopool.org"), Some("nanopool.org"));
        assert_eq!(match_pool_domain("F2POOL.COM."), Some("f2pool.com"));
        assert_eq!(match_pool_domain("notnanopool.org"), None);
        assert_eq!(match_pool_domain("nanopool.org.evil.net"), None);
    }
}
