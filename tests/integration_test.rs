extern crate ideabox_server;

mod integration_db;

use actix_web::{http::StatusCode, test, App};
use ideabox_server::{
    db::{
        idea::{IdeaId, NewIdea},
        postgres::PgStore,
        user::UserId,
        vote::{VoteDirection, VoteTally},
        Store,
    },
    http::auth::USER_ID_HEADER,
    managers::MemoryStore,
    server,
    services::vote::{VoteCoordinator, VoteError, VoteState},
};
use insta::assert_json_snapshot;
use integration_db::IntegrationTestDb;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

macro_rules! call {
    ($app:expr, $req:expr) => {{
        let resp = test::call_service(&$app, $req.to_request()).await;
        let status = resp.status();
        let body: Value = test::read_body_json(resp).await;
        (status, body)
    }};
}

async fn seed(store: &dyn Store, usernames: &[&str]) -> (IdeaId, Vec<UserId>) {
    let mut users = vec![];
    for username in usernames {
        // Suffixed so that several checks can share one database
        let username = format!("{}-{}", username, &Uuid::new_v4().simple().to_string()[..8]);
        let user = store.create_user(&username).await.unwrap().unwrap();
        users.push(user.id);
    }
    let idea = store
        .create_idea(NewIdea {
            title: "Covered bike parking".to_owned(),
            description: "Roofed racks next to the station".to_owned(),
            author_id: users[0].clone(),
            tags: vec![],
            targets: vec![],
        })
        .await
        .unwrap();
    (idea.id, users)
}

async fn tally(store: &dyn Store, idea_id: &IdeaId) -> VoteTally {
    store.idea_by_id(idea_id).await.unwrap().unwrap().tally()
}

fn counts(upvotes: i64, downvotes: i64) -> VoteTally {
    VoteTally { upvotes, downvotes }
}

// Store-independent checks, run against both stores

async fn check_vote_lifecycle(store: Arc<dyn Store>) {
    let (idea_id, users) = seed(store.as_ref(), &["alice"]).await;
    let user_id = users[0].clone();
    let coordinator = VoteCoordinator::new(store.clone());

    let outcome = coordinator
        .cast_vote(idea_id.clone(), user_id.clone(), VoteDirection::Up)
        .await
        .unwrap();
    assert_eq!(outcome.state, VoteState::Upvoted);
    assert_eq!((outcome.upvotes, outcome.downvotes), (1, 0));

    let outcome = coordinator
        .cast_vote(idea_id.clone(), user_id.clone(), VoteDirection::Down)
        .await
        .unwrap();
    assert_eq!(outcome.state, VoteState::Downvoted);
    assert_eq!((outcome.upvotes, outcome.downvotes), (0, 1));

    let outcome = coordinator
        .retract_vote(idea_id.clone(), user_id.clone(), VoteDirection::Down)
        .await
        .unwrap();
    assert_eq!(outcome.state, VoteState::None);
    assert_eq!((outcome.upvotes, outcome.downvotes), (0, 0));

    let err = coordinator
        .retract_vote(idea_id.clone(), user_id.clone(), VoteDirection::Down)
        .await
        .unwrap_err();
    assert!(matches!(err, VoteError::NoSuchVote(VoteDirection::Down)));

    assert_eq!(tally(store.as_ref(), &idea_id).await, counts(0, 0));
    assert!(store
        .votes_for_idea(&idea_id, VoteDirection::Up)
        .await
        .unwrap()
        .is_empty());
    assert!(store
        .votes_for_idea(&idea_id, VoteDirection::Down)
        .await
        .unwrap()
        .is_empty());
}

async fn check_duplicate_leaves_counters(store: Arc<dyn Store>) {
    let (idea_id, users) = seed(store.as_ref(), &["alice"]).await;
    let coordinator = VoteCoordinator::new(store.clone());

    coordinator
        .cast_vote(idea_id.clone(), users[0].clone(), VoteDirection::Down)
        .await
        .unwrap();
    let err = coordinator
        .cast_vote(idea_id.clone(), users[0].clone(), VoteDirection::Down)
        .await
        .unwrap_err();
    assert!(matches!(err, VoteError::DuplicateVote(VoteDirection::Down)));
    assert_eq!(tally(store.as_ref(), &idea_id).await, counts(0, 1));

    let err = coordinator
        .retract_vote(idea_id.clone(), users[0].clone(), VoteDirection::Up)
        .await
        .unwrap_err();
    assert!(matches!(err, VoteError::NoSuchVote(VoteDirection::Up)));
    assert_eq!(tally(store.as_ref(), &idea_id).await, counts(0, 1));
}

async fn check_concurrent_upvotes(store: Arc<dyn Store>) {
    let (idea_id, users) = seed(store.as_ref(), &["alice", "bob"]).await;
    let coordinator = VoteCoordinator::new(store.clone());

    let (first, second) = futures::join!(
        coordinator.cast_vote(idea_id.clone(), users[0].clone(), VoteDirection::Up),
        coordinator.cast_vote(idea_id.clone(), users[1].clone(), VoteDirection::Up),
    );
    first.unwrap();
    second.unwrap();

    assert_eq!(tally(store.as_ref(), &idea_id).await, counts(2, 0));
    let voters: Vec<UserId> = store
        .votes_for_idea(&idea_id, VoteDirection::Up)
        .await
        .unwrap()
        .into_iter()
        .map(|vote| vote.user_id)
        .collect();
    assert_eq!(voters.len(), 2);
    assert!(voters.contains(&users[0]));
    assert!(voters.contains(&users[1]));
}

async fn check_dropped_transaction_rolls_back(store: Arc<dyn Store>) {
    let (idea_id, users) = seed(store.as_ref(), &["alice"]).await;

    let mut tx = store.begin_vote(&idea_id).await.unwrap().unwrap();
    tx.insert_vote(&users[0], VoteDirection::Up).await.unwrap();
    let inside = tx.adjust_tally(VoteDirection::Up, 1).await.unwrap().unwrap();
    assert_eq!(inside, counts(1, 0));
    drop(tx);

    assert_eq!(tally(store.as_ref(), &idea_id).await, counts(0, 0));
    assert!(store
        .votes_by_user(&users[0], VoteDirection::Up)
        .await
        .unwrap()
        .is_empty());
}

async fn check_unknown_voter_refused(store: Arc<dyn Store>) {
    let (idea_id, _) = seed(store.as_ref(), &["alice"]).await;
    let stranger = UserId::new();

    let err = VoteCoordinator::new(store.clone())
        .cast_vote(idea_id.clone(), stranger.clone(), VoteDirection::Up)
        .await
        .unwrap_err();
    assert!(matches!(err, VoteError::Storage(_)));

    assert_eq!(tally(store.as_ref(), &idea_id).await, counts(0, 0));
    assert!(store
        .votes_for_idea(&idea_id, VoteDirection::Up)
        .await
        .unwrap()
        .is_empty());
}

async fn check_deleting_user_withdraws_votes(store: Arc<dyn Store>) {
    let (idea_id, users) = seed(store.as_ref(), &["alice", "bob"]).await;
    let (alice, bob) = (users[0].clone(), users[1].clone());
    let bobs_idea = store
        .create_idea(NewIdea {
            title: "Longer library hours".to_owned(),
            description: String::new(),
            author_id: bob.clone(),
            tags: vec![],
            targets: vec![],
        })
        .await
        .unwrap();
    let coordinator = VoteCoordinator::new(store.clone());
    coordinator
        .cast_vote(idea_id.clone(), bob.clone(), VoteDirection::Up)
        .await
        .unwrap();
    coordinator
        .cast_vote(idea_id.clone(), alice.clone(), VoteDirection::Down)
        .await
        .unwrap();
    coordinator
        .cast_vote(bobs_idea.id.clone(), alice.clone(), VoteDirection::Up)
        .await
        .unwrap();

    let deleted = store.delete_user(&bob).await.unwrap().unwrap();
    assert_eq!(deleted.id, bob);

    assert_eq!(tally(store.as_ref(), &idea_id).await, counts(0, 1));
    assert!(store
        .votes_for_idea(&idea_id, VoteDirection::Up)
        .await
        .unwrap()
        .is_empty());
    assert!(store.idea_by_id(&bobs_idea.id).await.unwrap().is_none());
    assert!(store
        .votes_by_user(&alice, VoteDirection::Up)
        .await
        .unwrap()
        .is_empty());
    assert!(store.user_by_id(&bob).await.unwrap().is_none());
    assert!(store.delete_user(&bob).await.unwrap().is_none());
}

#[actix_rt::test]
async fn test_vote_lifecycle() {
    check_vote_lifecycle(Arc::new(MemoryStore::new())).await;
}

#[actix_rt::test]
async fn test_duplicate_vote_leaves_counters() {
    check_duplicate_leaves_counters(Arc::new(MemoryStore::new())).await;
}

#[actix_rt::test]
async fn test_concurrent_upvotes() {
    check_concurrent_upvotes(Arc::new(MemoryStore::new())).await;
}

#[actix_rt::test]
async fn test_dropped_transaction_rolls_back() {
    check_dropped_transaction_rolls_back(Arc::new(MemoryStore::new())).await;
}

#[actix_rt::test]
async fn test_deleting_user_withdraws_votes() {
    check_deleting_user_withdraws_votes(Arc::new(MemoryStore::new())).await;
}

#[actix_rt::test]
async fn test_unknown_voter_refused() {
    check_unknown_voter_refused(Arc::new(MemoryStore::new())).await;
}

#[actix_rt::test]
async fn test_vote_on_missing_idea() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let user = store.create_user("alice").await.unwrap().unwrap();
    let coordinator = VoteCoordinator::new(store);

    let idea_id = IdeaId::new();
    let err = coordinator
        .cast_vote(idea_id.clone(), user.id, VoteDirection::Up)
        .await
        .unwrap_err();
    assert!(matches!(err, VoteError::NotFound(id) if id == idea_id));
}

#[actix_rt::test]
async fn test_deleting_idea_removes_votes() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let (idea_id, users) = seed(store.as_ref(), &["alice"]).await;
    VoteCoordinator::new(store.clone())
        .cast_vote(idea_id.clone(), users[0].clone(), VoteDirection::Up)
        .await
        .unwrap();

    store.delete_idea(&idea_id).await.unwrap().unwrap();

    assert!(store
        .votes_by_user(&users[0], VoteDirection::Up)
        .await
        .unwrap()
        .is_empty());
}

#[actix_rt::test]
async fn test_postgres_vote_lifecycle() {
    let db = match IntegrationTestDb::new().await {
        Some(db) => db,
        None => return,
    };
    check_vote_lifecycle(Arc::new(PgStore::new(db.pool()))).await;
    check_duplicate_leaves_counters(Arc::new(PgStore::new(db.pool()))).await;
}

#[actix_rt::test]
async fn test_postgres_concurrent_upvotes() {
    let db = match IntegrationTestDb::new().await {
        Some(db) => db,
        None => return,
    };
    check_concurrent_upvotes(Arc::new(PgStore::new(db.pool()))).await;
}

#[actix_rt::test]
async fn test_postgres_dropped_transaction_rolls_back() {
    let db = match IntegrationTestDb::new().await {
        Some(db) => db,
        None => return,
    };
    check_dropped_transaction_rolls_back(Arc::new(PgStore::new(db.pool()))).await;
}

#[actix_rt::test]
async fn test_postgres_unknown_voter_refused() {
    let db = match IntegrationTestDb::new().await {
        Some(db) => db,
        None => return,
    };
    check_unknown_voter_refused(Arc::new(PgStore::new(db.pool()))).await;
}

#[actix_rt::test]
async fn test_postgres_deleting_user_withdraws_votes() {
    let db = match IntegrationTestDb::new().await {
        Some(db) => db,
        None => return,
    };
    check_deleting_user_withdraws_votes(Arc::new(PgStore::new(db.pool()))).await;
}

// HTTP

#[actix_rt::test]
async fn test_http_vote_flow() {
    server::register_system_actors(Arc::new(MemoryStore::new()));
    let app = test::init_service(App::new().configure(server::configure)).await;

    let (status, body) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/users")
            .set_json(json!({ "username": "alice" }))
    );
    assert_eq!(status, StatusCode::CREATED);
    let user_id = body["success"]["data"]["id"].as_str().unwrap().to_owned();

    let (status, body) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/ideas")
            .insert_header((USER_ID_HEADER, user_id.as_str()))
            .set_json(json!({ "title": "Covered bike parking" }))
    );
    assert_eq!(status, StatusCode::CREATED);
    let idea_id = body["success"]["data"]["id"].as_str().unwrap().to_owned();
    assert_eq!(body["success"]["data"]["upvotes"], 0);

    let (status, body) = call!(
        app,
        test::TestRequest::post()
            .uri(&format!("/api/ideas/{}/upvote", idea_id))
            .insert_header((USER_ID_HEADER, user_id.as_str()))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reqPath"], format!("/api/ideas/{}/upvote", idea_id));
    assert_json_snapshot!(body["success"], {
        ".data.ideaId" => "[uuid]",
        ".data.userId" => "[uuid]"
    }, @r###"
    {
      "data": {
        "downvotes": 0,
        "ideaId": "[uuid]",
        "state": "upvoted",
        "upvotes": 1,
        "userId": "[uuid]"
      },
      "message": "successfully upvoted"
    }
    "###);

    let (status, body) = call!(
        app,
        test::TestRequest::post()
            .uri(&format!("/api/ideas/{}/upvote", idea_id))
            .insert_header((USER_ID_HEADER, user_id.as_str()))
    );
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(
        body["error"]["message"],
        "you have already upvoted this idea"
    );

    // Flags follow the caller
    let (_, body) = call!(
        app,
        test::TestRequest::get()
            .uri("/api/ideas")
            .insert_header((USER_ID_HEADER, user_id.as_str()))
    );
    let idea = &body["success"]["data"][0];
    assert_eq!(idea["upvotes"], 1);
    assert_eq!(idea["ifIUpvoted"], true);
    assert_eq!(idea["ifIDownvoted"], false);

    let (_, body) = call!(app, test::TestRequest::get().uri("/api/ideas"));
    assert_eq!(body["success"]["data"][0]["ifIUpvoted"], false);

    let (status, body) = call!(
        app,
        test::TestRequest::delete()
            .uri("/api/upvotes")
            .insert_header((USER_ID_HEADER, user_id.as_str()))
            .set_json(json!({ "ideaId": idea_id }))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"]["data"]["state"], "none");
    assert_eq!(body["success"]["data"]["upvotes"], 0);

    let (status, body) = call!(
        app,
        test::TestRequest::delete()
            .uri("/api/upvotes")
            .insert_header((USER_ID_HEADER, user_id.as_str()))
            .set_json(json!({ "ideaId": idea_id }))
    );
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["message"], "you haven't upvoted this idea yet");
}

#[actix_rt::test]
async fn test_http_rejections() {
    server::register_system_actors(Arc::new(MemoryStore::new()));
    let app = test::init_service(App::new().configure(server::configure)).await;

    let (_, body) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/users")
            .set_json(json!({ "username": "alice" }))
    );
    let user_id = body["success"]["data"]["id"].as_str().unwrap().to_owned();

    let missing = IdeaId::new().as_string();
    let (status, body) = call!(
        app,
        test::TestRequest::post()
            .uri(&format!("/api/ideas/{}/downvote", missing))
            .insert_header((USER_ID_HEADER, user_id.as_str()))
    );
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body,
        json!({
            "reqPath": format!("/api/ideas/{}/downvote", missing),
            "error": { "message": format!("idea {} not found", missing) },
        })
    );

    // Votes need an identified caller
    let (status, _) = call!(
        app,
        test::TestRequest::post().uri(&format!("/api/ideas/{}/upvote", missing))
    );
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call!(
        app,
        test::TestRequest::post()
            .uri(&format!("/api/ideas/{}/upvote", missing))
            .insert_header((USER_ID_HEADER, UserId::new().as_string().as_str()))
    );
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = call!(app, test::TestRequest::get().uri("/api/ideas/not-a-uuid"));
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["reqPath"], "/api/ideas/not-a-uuid");

    let (status, _) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/users")
            .set_json(json!({ "username": "alice" }))
    );
    assert_eq!(status, StatusCode::CONFLICT);
}

#[actix_rt::test]
async fn test_http_catalog() {
    server::register_system_actors(Arc::new(MemoryStore::new()));
    let app = test::init_service(App::new().configure(server::configure)).await;

    let (status, body) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/tags")
            .set_json(json!({ "name": " Transport " }))
    );
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"]["data"]["name"], "transport");
    let tag_id = body["success"]["data"]["id"].as_str().unwrap().to_owned();

    let (status, _) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/tags")
            .set_json(json!({ "name": "transport" }))
    );
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = call!(app, test::TestRequest::get().uri("/api/tags?name=trans"));
    assert_eq!(body["success"]["data"].as_array().unwrap().len(), 1);
    let (_, body) = call!(app, test::TestRequest::get().uri("/api/tags?name=energy"));
    assert_eq!(body["success"]["data"].as_array().unwrap().len(), 0);

    let (_, body) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/users")
            .set_json(json!({ "username": "alice" }))
    );
    let user_id = body["success"]["data"]["id"].as_str().unwrap().to_owned();

    let (status, body) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/ideas")
            .insert_header((USER_ID_HEADER, user_id.as_str()))
            .set_json(json!({ "title": "Night buses", "tags": [tag_id] }))
    );
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"]["data"]["tags"], json!([tag_id]));
    let idea_id = body["success"]["data"]["id"].as_str().unwrap().to_owned();

    let (status, _) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/ideas")
            .insert_header((USER_ID_HEADER, user_id.as_str()))
            .set_json(json!({ "title": "Night trams", "targets": [IdeaId::new()] }))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call!(
        app,
        test::TestRequest::delete().uri(&format!("/api/tags/{}", tag_id))
    );
    assert_eq!(status, StatusCode::OK);

    let (_, body) = call!(
        app,
        test::TestRequest::get().uri(&format!("/api/ideas/{}", idea_id))
    );
    assert_eq!(body["success"]["data"]["tags"], json!([]));

    let (_, body) = call!(app, test::TestRequest::get().uri("/api/ideas/count"));
    assert_eq!(body["success"]["data"], 1);
}

#[actix_rt::test]
async fn test_http_catalog_updates() {
    server::register_system_actors(Arc::new(MemoryStore::new()));
    let app = test::init_service(App::new().configure(server::configure)).await;

    let mut tag_ids = vec![];
    for name in &["transport", "energy"] {
        let (_, body) = call!(
            app,
            test::TestRequest::post()
                .uri("/api/tags")
                .set_json(json!({ "name": name }))
        );
        tag_ids.push(body["success"]["data"]["id"].as_str().unwrap().to_owned());
    }

    let (_, body) = call!(app, test::TestRequest::get().uri("/api/tags/count"));
    assert_eq!(body["success"]["data"], 2);

    let (status, body) = call!(
        app,
        test::TestRequest::put()
            .uri(&format!("/api/tags/{}", tag_ids[0]))
            .set_json(json!({ "name": "Mobility" }))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"]["message"], "tag successfully updated");

    let (_, body) = call!(
        app,
        test::TestRequest::get().uri(&format!("/api/tags/{}", tag_ids[0]))
    );
    assert_eq!(body["success"]["data"]["name"], "mobility");

    let (status, _) = call!(
        app,
        test::TestRequest::put()
            .uri(&format!("/api/tags/{}", tag_ids[1]))
            .set_json(json!({ "name": "mobility" }))
    );
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call!(
        app,
        test::TestRequest::get().uri(&format!("/api/tags/{}", Uuid::new_v4()))
    );
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/targets")
            .set_json(json!({ "name": "students" }))
    );
    let target_id = body["success"]["data"]["id"].as_str().unwrap().to_owned();

    let (status, body) = call!(
        app,
        test::TestRequest::put()
            .uri(&format!("/api/targets/{}", target_id))
            .set_json(json!({ "name": "Commuters" }))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"]["data"]["name"], "commuters");

    let (_, body) = call!(
        app,
        test::TestRequest::get().uri(&format!("/api/targets/{}", target_id))
    );
    assert_eq!(body["success"]["data"]["name"], "commuters");

    let (_, body) = call!(app, test::TestRequest::get().uri("/api/targets/count"));
    assert_eq!(body["success"]["data"], 1);

    let (status, _) = call!(
        app,
        test::TestRequest::put()
            .uri(&format!("/api/targets/{}", Uuid::new_v4()))
            .set_json(json!({ "name": "librarians" }))
    );
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn test_http_user_accounts() {
    server::register_system_actors(Arc::new(MemoryStore::new()));
    let app = test::init_service(App::new().configure(server::configure)).await;

    let mut user_ids = vec![];
    for username in &["alice", "bob"] {
        let (_, body) = call!(
            app,
            test::TestRequest::post()
                .uri("/api/users")
                .set_json(json!({ "username": username }))
        );
        user_ids.push(body["success"]["data"]["id"].as_str().unwrap().to_owned());
    }
    let (alice, bob) = (user_ids[0].as_str(), user_ids[1].as_str());

    let (_, body) = call!(app, test::TestRequest::get().uri("/api/users"));
    let usernames: Vec<&str> = body["success"]["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|user| user["username"].as_str().unwrap())
        .collect();
    assert_eq!(usernames, vec!["alice", "bob"]);

    // Only the account owner may change it
    let (status, _) = call!(
        app,
        test::TestRequest::put()
            .uri(&format!("/api/users/{}", bob))
            .insert_header((USER_ID_HEADER, alice))
            .set_json(json!({ "username": "mallory" }))
    );
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call!(
        app,
        test::TestRequest::put()
            .uri(&format!("/api/users/{}", alice))
            .insert_header((USER_ID_HEADER, alice))
            .set_json(json!({ "username": "bob" }))
    );
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = call!(
        app,
        test::TestRequest::put()
            .uri(&format!("/api/users/{}", alice))
            .insert_header((USER_ID_HEADER, alice))
            .set_json(json!({ "username": "alicia" }))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"]["data"]["username"], "alicia");

    let (_, body) = call!(
        app,
        test::TestRequest::post()
            .uri("/api/ideas")
            .insert_header((USER_ID_HEADER, bob))
            .set_json(json!({ "title": "Longer library hours" }))
    );
    let idea_id = body["success"]["data"]["id"].as_str().unwrap().to_owned();
    let (status, _) = call!(
        app,
        test::TestRequest::post()
            .uri(&format!("/api/ideas/{}/upvote", idea_id))
            .insert_header((USER_ID_HEADER, alice))
    );
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call!(
        app,
        test::TestRequest::delete()
            .uri(&format!("/api/users/{}", alice))
            .insert_header((USER_ID_HEADER, alice))
    );
    assert_eq!(status, StatusCode::OK);

    let (_, body) = call!(
        app,
        test::TestRequest::get().uri(&format!("/api/ideas/{}", idea_id))
    );
    assert_eq!(body["success"]["data"]["upvotes"], 0);

    let (status, _) = call!(
        app,
        test::TestRequest::get().uri(&format!("/api/users/{}", alice))
    );
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The deleted account can no longer act
    let (status, _) = call!(
        app,
        test::TestRequest::post()
            .uri(&format!("/api/ideas/{}/upvote", idea_id))
            .insert_header((USER_ID_HEADER, alice))
    );
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
