use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored hospital
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct HospitalRecord {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub phone: Option<String>,
    /// Batch that created the record
    pub creation_batch_id: String,
    /// Set only when the creating batch completes without failures
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// A hospital about to be inserted; always starts inactive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHospital {
    pub name: String,
    pub address: String,
    pub phone: Option<String>,
    pub creation_batch_id: String,
}

impl NewHospital {
    pub fn from_fields(fields: hdir_ingest::HospitalFields, batch_id: &str) -> Self {
        Self {
            name: fields.name,
            address: fields.address,
            phone: fields.phone,
            creation_batch_id: batch_id.to_string(),
        }
    }
}

/// Partial update; `None` leaves a column unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HospitalPatch {
    pub name: Option<String>,
    pub address: Option<String>,
    /// `Some(None)` clears the phone
    pub phone: Option<Option<String>>,
    pub active: Option<bool>,
}

impl HospitalPatch {
    pub fn activate() -> Self {
        Self {
            active: Some(true),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.address.is_none() && self.phone.is_none() && self.active.is_none()
    }

    pub fn apply(&self, record: &mut HospitalRecord) {
        if let Some(name) = &self.name {
            record.name = name.clone();
        }
        if let Some(address) = &self.address {
            record.address = address.clone();
        }
        if let Some(phone) = &self.phone {
            record.phone = phone.clone();
        }
        if let Some(active) = self.active {
            record.active = active;
        }
    }
}

/// Selection for queries and bulk deletes. Empty matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HospitalFilter {
    pub creation_batch_id: Option<String>,
    pub active: Option<bool>,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

impl HospitalFilter {
    pub fn batch(batch_id: impl Into<String>) -> Self {
        Self {
            creation_batch_id: Some(batch_id.into()),
            ..Default::default()
        }
    }

    pub fn matches(&self, record: &HospitalRecord) -> bool {
        self.creation_batch_id
            .as_deref()
            .map_or(true, |batch| record.creation_batch_id == batch)
            && self.active.map_or(true, |active| record.active == active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> HospitalRecord {
        HospitalRecord {
            id: 1,
            name: "General".into(),
            address: "1 Main St".into(),
            phone: None,
            creation_batch_id: "b1".into(),
            active: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_patch_apply_leaves_unset_columns() {
        let mut r = record();
        HospitalPatch {
            phone: Some(Some("555".into())),
            ..Default::default()
        }
        .apply(&mut r);
        assert_eq!(r.name, "General");
        assert_eq!(r.phone.as_deref(), Some("555"));
        assert!(!r.active);

        HospitalPatch::default().apply(&mut r);
        assert_eq!(r.phone.as_deref(), Some("555"));

        HospitalPatch {
            phone: Some(None),
            ..Default::default()
        }
        .apply(&mut r);
        assert_eq!(r.phone, None);
    }

    #[test]
    fn test_filter_matches() {
        let r = record();
        assert!(HospitalFilter::default().matches(&r));
        assert!(HospitalFilter::batch("b1").matches(&r));
        assert!(!HospitalFilter::batch("b2").matches(&r));
        let active_only = HospitalFilter {
            active: Some(true),
            ..Default::default()
        };
        assert!(!active_only.matches(&r));
    }
}
