//! Canonical permit identity.
//!
//! Jurisdictions publish permits under different identifier fields. A lead is
//! keyed by one canonical identifier so the same permit never produces two
//! leads, whichever fields a given feed happens to fill in.

use crate::models::Permit;

/// Returns the canonical external identifier for a permit.
///
/// Precedence: explicit permit id, permit number, source record id, internal
/// row id. The first candidate with a non-blank value wins and is returned
/// trimmed. The internal id always exists, so this never fails.
pub fn resolve_external_id(permit: &Permit) -> String {
    [
        permit.permit_id.as_deref(),
        permit.permit_number.as_deref(),
        Some(permit.source_record_id.as_str()),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .find(|candidate| !candidate.is_empty())
    .map(str::to_string)
    .unwrap_or_else(|| permit.id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn permit() -> Permit {
        Permit {
            id: Uuid::parse_str("8f14e45f-ceea-4a7b-9d3c-1f2e3d4c5b6a").unwrap(),
            source: "austin".to_string(),
            source_record_id: String::new(),
            permit_id: None,
            permit_number: None,
            work_description: None,
            permit_type: None,
            valuation: None,
            issue_date: None,
            application_date: None,
            address: None,
            city: None,
            state: None,
            zip_code: None,
            year_built: None,
            applicant_name: None,
            owner_name: None,
            contractor_name: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn test_permit_id_wins() {
        let mut p = permit();
        p.permit_id = Some("PID-1".into());
        p.permit_number = Some("BP-2".into());
        p.source_record_id = "REC-3".into();

        assert_eq!(resolve_external_id(&p), "PID-1");
    }

    #[test]
    fn test_blank_fields_are_skipped() {
        let mut p = permit();
        p.permit_id = Some("   ".into());
        p.permit_number = Some("".into());
        p.source_record_id = "  REC-3 ".into();

        assert_eq!(resolve_external_id(&p), "REC-3");
    }

    #[test]
    fn test_permit_number_before_source_record() {
        let mut p = permit();
        p.permit_number = Some(" BP-2".into());
        p.source_record_id = "REC-3".into();

        assert_eq!(resolve_external_id(&p), "BP-2");
    }

    #[test]
    fn test_falls_back_to_internal_id() {
        let p = permit();
        assert_eq!(
            resolve_external_id(&p),
            "8f14e45f-ceea-4a7b-9d3c-1f2e3d4c5b6a"
        );
    }
}
