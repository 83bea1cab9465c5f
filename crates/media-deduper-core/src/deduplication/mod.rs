use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::types::{DuplicatePair, DuplicateReport, FileRecord};

/// Similarity as a percentage of matching bits, rounded to two decimals
pub fn similarity_percentage(distance: u32, bits: u32) -> f64 {
    if bits == 0 {
        return 100.0;
    }
    let matching = bits.saturating_sub(distance) as f64;
    (matching / bits as f64 * 10_000.0).round() / 100.0
}

/// Check a query threshold against the fingerprint width
pub fn validate_threshold(threshold: u32, bits: u32) -> Result<()> {
    if threshold > bits {
        return Err(Error::InvalidThreshold {
            threshold,
            max: bits,
        });
    }
    Ok(())
}

/// Finds every unordered pair of records within `threshold` bits.
///
/// Records are compared in path order and each pair appears once, with
/// `file1` sorting before `file2`. Records whose fingerprint width is not
/// `bits` are left out.
pub fn find_duplicate_pairs(mut records: Vec<FileRecord>, threshold: u32, bits: u32) -> Vec<DuplicatePair> {
    records.retain(|r| r.fingerprint.bit_len() == bits);
    records.sort_by(|a, b| a.path.cmp(&b.path));

    let records = &records;
    // Indexed collect keeps row order, so output is deterministic
    let rows: Vec<Vec<DuplicatePair>> = (0..records.len())
        .into_par_iter()
        .map(|i| {
            let left = &records[i];
            records[i + 1..]
                .iter()
                .filter_map(|right| {
                    let distance = left.fingerprint.distance(&right.fingerprint);
                    (distance <= threshold).then(|| DuplicatePair {
                        file1: left.clone(),
                        file2: right.clone(),
                        similarity_score: distance,
                        similarity_percentage: similarity_percentage(distance, bits),
                    })
                })
                .collect()
        })
        .collect();

    rows.into_iter().flatten().collect()
}

/// Wrap pairs with their totals
pub fn build_report(pairs: Vec<DuplicatePair>) -> DuplicateReport {
    let total_potential_savings_bytes = pairs.iter().map(|p| p.potential_savings()).sum();
    DuplicateReport {
        total_pairs: pairs.len(),
        total_potential_savings_bytes,
        pairs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::Fingerprint;
    use crate::test_utils::sample_record;

    #[test]
    fn test_similarity_percentage() {
        assert_eq!(similarity_percentage(0, 64), 100.0);
        assert_eq!(similarity_percentage(3, 64), 95.31);
        assert_eq!(similarity_percentage(64, 64), 0.0);
        assert_eq!(similarity_percentage(1, 3), 66.67);
    }

    #[test]
    fn test_validate_threshold() {
        assert!(validate_threshold(0, 64).is_ok());
        assert!(validate_threshold(64, 64).is_ok());
        assert!(matches!(
            validate_threshold(65, 64),
            Err(Error::InvalidThreshold { threshold: 65, max: 64 })
        ));
    }

    #[test]
    fn test_pairs_within_threshold() {
        let records = vec![
            sample_record("/m/c.jpg", 0xFFFF_F000_0000_0000, 300),
            sample_record("/m/a.jpg", 0, 100),
            sample_record("/m/b.jpg", 0b111, 200),
        ];

        let pairs = find_duplicate_pairs(records.clone(), 5, 64);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].file1.filename, "a.jpg");
        assert_eq!(pairs[0].file2.filename, "b.jpg");
        assert_eq!(pairs[0].similarity_score, 3);
        assert_eq!(pairs[0].similarity_percentage, 95.31);

        let all = find_duplicate_pairs(records, 25, 64);
        assert_eq!(all.len(), 3);
        let order: Vec<(&str, &str)> = all
            .iter()
            .map(|p| (p.file1.filename.as_str(), p.file2.filename.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![("a.jpg", "b.jpg"), ("a.jpg", "c.jpg"), ("b.jpg", "c.jpg")]
        );
    }

    #[test]
    fn test_threshold_zero_finds_identical_only() {
        let records = vec![
            sample_record("/m/a.jpg", 42, 10),
            sample_record("/m/b.jpg", 42, 10),
            sample_record("/m/c.jpg", 43, 10),
        ];
        let pairs = find_duplicate_pairs(records, 0, 64);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].similarity_percentage, 100.0);
    }

    #[test]
    fn test_raising_threshold_never_loses_pairs() {
        let records: Vec<_> = (0..12u64)
            .map(|i| sample_record(&format!("/m/{:02}.jpg", i), (1u64 << i) - 1, 10 + i))
            .collect();

        let mut previous = 0;
        for threshold in 0..=64 {
            let count = find_duplicate_pairs(records.clone(), threshold, 64).len();
            assert!(count >= previous);
            previous = count;
        }
        assert_eq!(previous, 12 * 11 / 2);
    }

    #[test]
    fn test_mismatched_width_is_ignored() {
        let mut wide = sample_record("/m/wide.jpg", 0, 10);
        wide.fingerprint = Fingerprint::from_bits(&[false; 256]);
        let records = vec![
            sample_record("/m/a.jpg", 0, 10),
            sample_record("/m/b.jpg", 0, 10),
            wide,
        ];

        let pairs = find_duplicate_pairs(records, 64, 64);
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn test_report_uses_smaller_file_for_savings() {
        let records = vec![
            sample_record("/m/a.jpg", 0, 1_000),
            sample_record("/m/b.jpg", 1, 400),
            sample_record("/m/c.jpg", 3, 700),
        ];
        let report = build_report(find_duplicate_pairs(records, 5, 64));

        assert_eq!(report.total_pairs, 3);
        // min(1000,400) + min(1000,700) + min(400,700)
        assert_eq!(report.total_potential_savings_bytes, 400 + 700 + 400);
    }

    #[test]
    fn test_empty_input() {
        let report = build_report(find_duplicate_pairs(Vec::new(), 5, 64));
        assert_eq!(report.total_pairs, 0);
        assert_eq!(report.total_potential_savings_bytes, 0);
    }
}
