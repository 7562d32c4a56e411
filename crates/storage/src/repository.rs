//! Repository Implementation

use crate::StorageError;
use chrono::{DateTime, Utc};
use risk_scoring::{severity_index, Assessment};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// Current assessment record for one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAssessment {
    /// Stable across upserts for the same user
    pub id: Uuid,
    pub user_id: String,
    pub assessment: Assessment,
    /// Legacy severity-weighted index of the assessment's factors
    pub severity_index: u32,
    /// Last shared summary text
    pub social_summary: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persistence boundary for assessments.
///
/// One current assessment per user; a new one replaces the prior.
pub trait AssessmentRepository: Send + Sync + 'static {
    fn upsert_latest(
        &self,
        user_id: &str,
        assessment: Assessment,
    ) -> impl Future<Output = Result<StoredAssessment, StorageError>> + Send;

    fn get_latest(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Option<StoredAssessment>, StorageError>> + Send;
}

/// Repository for data access (in-memory implementation)
pub struct InMemoryAssessmentRepository {
    records: Mutex<HashMap<String, StoredAssessment>>,
}

impl InMemoryAssessmentRepository {
    pub fn new() -> Self {
        info!("Creating in-memory assessment repository");
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Number of users with a stored assessment
    pub fn len(&self) -> Result<usize, StorageError> {
        self.records
            .lock()
            .map(|r| r.len())
            .map_err(|e| StorageError::DatabaseError(format!("Lock error: {}", e)))
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    fn upsert(&self, user_id: &str, assessment: Assessment) -> Result<StoredAssessment, StorageError> {
        if user_id.trim().is_empty() {
            return Err(StorageError::InvalidUserId(user_id.to_string()));
        }
        let mut records = self
            .records
            .lock()
            .map_err(|e| StorageError::DatabaseError(format!("Lock error: {}", e)))?;

        let now = Utc::now();
        let index = severity_index(&assessment.factors);
        let social_summary = assessment.social_summary.clone();

        let record = match records.get(user_id) {
            Some(existing) => StoredAssessment {
                id: existing.id,
                created_at: existing.created_at,
                user_id: user_id.to_string(),
                assessment,
                severity_index: index,
                social_summary,
                updated_at: now,
            },
            None => StoredAssessment {
                id: Uuid::new_v4(),
                created_at: now,
                user_id: user_id.to_string(),
                assessment,
                severity_index: index,
                social_summary,
                updated_at: now,
            },
        };

        records.insert(user_id.to_string(), record.clone());
        debug!("Upserted assessment {} for user {}", record.id, user_id);
        Ok(record)
    }

    fn get(&self, user_id: &str) -> Result<Option<StoredAssessment>, StorageError> {
        let records = self
            .records
            .lock()
            .map_err(|e| StorageError::DatabaseError(format!("Lock error: {}", e)))?;
        Ok(records.get(user_id).cloned())
    }
}

impl Default for InMemoryAssessmentRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl AssessmentRepository for InMemoryAssessmentRepository {
    async fn upsert_latest(
        &self,
        user_id: &str,
        assessment: Assessment,
    ) -> Result<StoredAssessment, StorageError> {
        self.upsert(user_id, assessment)
    }

    async fn get_latest(&self, user_id: &str) -> Result<Option<StoredAssessment>, StorageError> {
        self.get(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use risk_scoring::{score, Melanation, QuestionnaireInput, SkinType, SunExposure};

    fn assessment(age: u32, smoking: bool) -> Assessment {
        score(
            &QuestionnaireInput {
                age,
                gender: "Female".into(),
                skin_type: SkinType::Normal,
                melanation: Melanation::Light,
                concerns: vec![],
                allergies: vec![],
                underlying_conditions: vec![],
                medications: vec![],
                smoking,
                sun_exposure: SunExposure::Minimal,
                water_intake: None,
                treatments_wanted: vec![],
                pregnancy_or_breastfeeding: false,
            },
            None,
        )
    }

    #[tokio::test]
    async fn test_get_missing_user() {
        let repo = InMemoryAssessmentRepository::new();
        assert!(repo.get_latest("nobody").await.unwrap().is_none());
        assert!(repo.is_empty().unwrap());
    }

    #[test]
    fn test_poisoned_lock_is_reported() {
        let repo = InMemoryAssessmentRepository::new();
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _records = repo.records.lock().unwrap();
            panic!("writer died holding the lock");
        }));

        assert!(matches!(repo.len(), Err(StorageError::DatabaseError(_))));
        assert!(repo.is_empty().is_err());
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_keeps_id() {
        let repo = InMemoryAssessmentRepository::new();

        let first = repo.upsert_latest("user-1", assessment(30, false)).await.unwrap();
        let second = repo.upsert_latest("user-1", assessment(30, true)).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(repo.len().unwrap(), 1);

        let latest = repo.get_latest("user-1").await.unwrap().unwrap();
        assert_eq!(latest, second);
        assert!(latest.assessment.factors.iter().any(|f| f.description == "Active smoker"));
    }

    #[tokio::test]
    async fn test_users_are_independent() {
        let repo = InMemoryAssessmentRepository::new();
        let a = repo.upsert_latest("a", assessment(20, false)).await.unwrap();
        let b = repo.upsert_latest("b", assessment(50, false)).await.unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(repo.len().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_severity_index_and_summary_stored() {
        let repo = InMemoryAssessmentRepository::new();
        // age Low, skin type Low, tone Low, smoker Medium
        let stored = repo.upsert_latest("u", assessment(20, true)).await.unwrap();

        assert_eq!(stored.severity_index, 100 - 5 - 5 - 5 - 10);
        assert_eq!(stored.social_summary, stored.assessment.social_summary);
    }

    #[tokio::test]
    async fn test_blank_user_rejected() {
        let repo = InMemoryAssessmentRepository::new();
        let err = repo.upsert_latest(" ", assessment(20, false)).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidUserId(_)));
    }
}
