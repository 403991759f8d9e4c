use std::sync::Arc;

use lark_agent_gateway::models::project::Project;
use lark_agent_gateway::persistence::{db, project_repo::ProjectRepo};
use lark_agent_gateway::AppError;

fn project(chat: &str, title: &str, folder: &str) -> Project {
    Project::new(
        chat.into(),
        "ou_user".into(),
        title.into(),
        Some("desc".into()),
        folder.into(),
    )
    .expect("valid project")
}

async fn repo() -> ProjectRepo {
    let pool = db::connect_memory().await.expect("db connect");
    ProjectRepo::new(Arc::new(pool))
}

#[tokio::test]
async fn create_and_fetch_roundtrip() {
    let repo = repo().await;
    let created = repo
        .create(&project("oc_1", "Demo", "demo"))
        .await
        .expect("create");

    let fetched = repo
        .get_by_id(&created.id)
        .await
        .expect("query")
        .expect("exists");
    assert_eq!(fetched.title, "Demo");
    assert_eq!(fetched.folder_name, "demo");
    assert_eq!(fetched.description.as_deref(), Some("desc"));
}

#[tokio::test]
async fn listing_is_scoped_to_the_chat() {
    let repo = repo().await;
    repo.create(&project("oc_1", "A", "a")).await.expect("a");
    repo.create(&project("oc_1", "B", "b")).await.expect("b");
    repo.create(&project("oc_2", "C", "c")).await.expect("c");

    let listed = repo.list_by_chat("oc_1").await.expect("list");
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|p| p.chat_id == "oc_1"));
}

#[tokio::test]
async fn update_rewrites_fields_and_validates_folder() {
    let repo = repo().await;
    let created = repo
        .create(&project("oc_1", "Demo", "demo"))
        .await
        .expect("create");

    repo.update(&created.id, "Demo 2", None, "demo-2")
        .await
        .expect("update");
    let fetched = repo
        .get_by_id(&created.id)
        .await
        .expect("query")
        .expect("exists");
    assert_eq!(fetched.title, "Demo 2");
    assert_eq!(fetched.folder_name, "demo-2");
    assert!(fetched.description.is_none());

    let err = repo
        .update(&created.id, "Demo 3", None, "bad/name")
        .await
        .expect_err("invalid folder");
    assert!(matches!(err, AppError::Config(_)));
}

#[tokio::test]
async fn delete_removes_the_row() {
    let repo = repo().await;
    let created = repo
        .create(&project("oc_1", "Demo", "demo"))
        .await
        .expect("create");
    repo.delete(&created.id).await.expect("delete");
    assert!(repo.get_by_id(&created.id).await.expect("query").is_none());
}
