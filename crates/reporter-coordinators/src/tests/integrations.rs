//! IntegrationService CRUD.

use super::harness::{TestHarness, INTERNAL, PROJECT_ID};
use crate::{CoordinatorError, IntegrationUpdate, NewIntegration, VerifyConfig};
use reporter_database::ConfigStore;

fn new_integration(rev: Option<&str>) -> NewIntegration {
    NewIntegration {
        url: "https://tracker.example".to_string(),
        token: "perm:abc".to_string(),
        project: "P".to_string(),
        update_rev: rev.map(str::to_string),
    }
}

fn update(rev: &str, project: &str) -> IntegrationUpdate {
    IntegrationUpdate {
        url: "https://tracker.example".to_string(),
        token: "perm:abc".to_string(),
        project: project.to_string(),
        update_rev: rev.to_string(),
    }
}

#[tokio::test]
async fn create_stores_config_and_requests_verification() {
    let h = TestHarness::new().await;
    let service = h.integrations();

    let config = service.create(new_integration(Some("r1"))).await.unwrap();

    assert_eq!(config.update_rev, "r1");
    assert!(config.project_id.is_none());
    assert_eq!(service.get(&config.id).await.unwrap(), config);
    assert_eq!(
        h.produced::<VerifyConfig>(INTERNAL).await,
        vec![VerifyConfig {
            config_id: config.id.clone(),
            update_rev: "r1".to_string(),
        }]
    );
}

#[tokio::test]
async fn create_without_revision_gets_a_fresh_one() {
    let h = TestHarness::new().await;
    let service = h.integrations();

    let a = service.create(new_integration(None)).await.unwrap();
    let b = service.create(new_integration(None)).await.unwrap();

    assert!(!a.update_rev.is_empty());
    assert_ne!(a.update_rev, b.update_rev);
    assert_ne!(a.id, b.id);
    assert_eq!(service.list().await.unwrap().len(), 2);
}

#[tokio::test]
async fn create_rejects_bad_input() {
    let h = TestHarness::new().await;
    let service = h.integrations();

    let mut bad_url = new_integration(None);
    bad_url.url = "tracker.example".to_string();
    let mut no_token = new_integration(None);
    no_token.token = "  ".to_string();

    for input in [bad_url, no_token] {
        assert!(matches!(
            service.create(input).await,
            Err(CoordinatorError::InvalidInput(_))
        ));
    }
    assert!(h.produced::<VerifyConfig>(INTERNAL).await.is_empty());
}

#[tokio::test]
async fn update_clears_project_id_only_when_connection_changes() {
    let h = TestHarness::new().await;
    let service = h.integrations();
    let created = service.create(new_integration(Some("r1"))).await.unwrap();

    let mut validated = created.clone();
    validated.project_id = Some(PROJECT_ID.to_string());
    ConfigStore::update(&h.db, validated).await.unwrap();

    let (old, new) = service.update(&created.id, update("r2", "P")).await.unwrap();
    assert_eq!(old.update_rev, "r1");
    assert_eq!(new.update_rev, "r2");
    assert_eq!(new.project_id.as_deref(), Some(PROJECT_ID));

    let (_, moved) = service.update(&created.id, update("r3", "Q")).await.unwrap();
    assert_eq!(moved.project, "Q");
    assert!(moved.project_id.is_none());

    let revs: Vec<_> = h
        .produced::<VerifyConfig>(INTERNAL)
        .await
        .into_iter()
        .map(|v| v.update_rev)
        .collect();
    assert_eq!(revs, vec!["r1", "r2", "r3"]);
}

#[tokio::test]
async fn missing_ids_are_not_found() {
    let h = TestHarness::new().await;
    let service = h.integrations();

    assert!(service.get("missing").await.unwrap_err().is_not_found());
    assert!(service.delete("missing").await.unwrap_err().is_not_found());
    assert!(service
        .update("missing", update("r1", "P"))
        .await
        .unwrap_err()
        .is_not_found());
    assert!(h.produced::<VerifyConfig>(INTERNAL).await.is_empty());
}

#[tokio::test]
async fn delete_removes_config() {
    let h = TestHarness::new().await;
    let service = h.integrations();
    let config = service.create(new_integration(None)).await.unwrap();

    service.delete(&config.id).await.unwrap();

    assert!(service.get(&config.id).await.unwrap_err().is_not_found());
}
