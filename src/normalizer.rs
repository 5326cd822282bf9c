use tracing::warn;

use crate::types::{AggregateStats, EngineResults, FileIdentity, ScanVerdict};

/// Builds the verdict for a finished analysis.
///
/// Inputs are borrowed and copied: every engine entry is carried over as the
/// service reported it, categories included.
pub fn normalize(
    identity: FileIdentity,
    stats: &AggregateStats,
    results: &EngineResults,
) -> ScanVerdict {
    if stats.total() != results.len() as u64 {
        warn!(
            file_name = %identity.file_name,
            stats_total = stats.total(),
            engines = results.len(),
            "engine count in stats differs from per-engine results"
        );
    }

    ScanVerdict::from_parts(identity, *stats, results.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EngineCategory, EngineFinding, HashSource};

    fn identity() -> FileIdentity {
        FileIdentity {
            file_name: "sample.exe".to_string(),
            file_size: 10,
            file_hash: "ff00".to_string(),
            hash_source: HashSource::Service,
            content_sha256: "ff00".to_string(),
            file_type: "Win32 EXE".to_string(),
        }
    }

    fn finding(category: &str, engine: &str, result: Option<&str>) -> EngineFinding {
        EngineFinding {
            category: EngineCategory::from(category.to_string()),
            engine_name: engine.to_string(),
            result: result.map(str::to_string),
        }
    }

    #[test]
    fn derives_counts_from_stats() {
        let stats = AggregateStats {
            malicious: 2,
            suspicious: 1,
            undetected: 1,
            ..Default::default()
        };
        let mut results = EngineResults::new();
        results.insert("A".into(), finding("malicious", "A", Some("Trojan.X")));
        results.insert("B".into(), finding("malicious", "B", Some("Gen:Variant")));
        results.insert("C".into(), finding("suspicious", "C", None));
        results.insert("D".into(), finding("undetected", "D", None));

        let verdict = normalize(identity(), &stats, &results);
        assert_eq!(verdict.malicious_count(), 3);
        assert!(verdict.is_malicious());
        assert_eq!(verdict.total_engines(), 4);
        assert!(!verdict.engine_count_drift());
    }

    #[test]
    fn keeps_every_engine_and_leaves_inputs_untouched() {
        let stats = AggregateStats {
            undetected: 1,
            type_unsupported: 1,
            ..Default::default()
        };
        let mut results = EngineResults::new();
        results.insert("Clam".into(), finding("undetected", "ClamAV", None));
        results.insert("Odd".into(), finding("type-unsupported", "OddAV", None));
        results.insert("New".into(), finding("quarantined", "NewAV", Some("x")));
        let before = results.clone();

        let verdict = normalize(identity(), &stats, &results);
        assert_eq!(verdict.results(), &before);
        assert_eq!(results, before);
        assert_eq!(
            verdict.results()["New"].category,
            EngineCategory::Other("quarantined".into())
        );
        assert!(verdict.engine_count_drift());
        assert!(!verdict.is_malicious());
    }

    #[test]
    fn serializes_with_stable_field_names() {
        let mut results = EngineResults::new();
        results.insert("Clam".into(), finding("undetected", "ClamAV", None));
        let stats = AggregateStats {
            undetected: 1,
            ..Default::default()
        };
        let json = serde_json::to_value(normalize(identity(), &stats, &results)).unwrap();

        assert_eq!(json["file_name"], "sample.exe");
        assert_eq!(json["file_hash"], "ff00");
        assert_eq!(json["hash_source"], "service");
        assert_eq!(json["malicious_count"], 0);
        assert_eq!(json["total_engines"], 1);
        assert_eq!(json["is_malicious"], false);
        assert_eq!(json["stats"]["confirmed-timeout"], 0);
        assert_eq!(json["results"]["Clam"]["category"], "undetected");
        assert_eq!(json["results"]["Clam"]["engine_name"], "ClamAV");
        assert!(json["results"]["Clam"]["result"].is_null());
    }
}
