//! Enrollment service talking to a real Track service over HTTP.

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code uses expect for clear failure messages

use axum::http::StatusCode;
use axum_test::TestServer;
use enrollment_coordinator::{CallGuard, CoordinatorEnvironment};
use enrollment_core::error::StorageError;
use enrollment_core::participant::{Lifecycle, Participant, ParticipantId};
use enrollment_core::stores::{CapacityQuery, TrackStore};
use enrollment_core::track::{
    AdjustmentDirection, AdjustmentToken, CapacityAdjustment, Track, TrackFilter, TrackId,
    VoidOutcome,
};
use enrollment_registry::{AppState, TrackServiceClient, build_router};
use enrollment_runtime::retry::RetryPolicy;
use enrollment_testing::{
    InMemoryParticipantStore, InMemoryReconciliationLog, InMemoryTrackStore, test_clock,
};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Serve a fresh in-memory Track service on an ephemeral port.
async fn spawn_track_service() -> SocketAddr {
    let state = track_registry::AppState::new(Arc::new(InMemoryTrackStore::new()), "memory");
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind track service");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, track_registry::build_router(state))
            .await
            .expect("track service");
    });
    addr
}

fn client(addr: SocketAddr) -> TrackServiceClient {
    TrackServiceClient::new(&format!("http://{addr}"), Duration::from_secs(2)).expect("client")
}

#[tokio::test]
async fn client_round_trips_track_operations() {
    let client = client(spawn_track_service().await);

    let track = client.create_track(Track::new("Networking", 1)).await.unwrap();
    assert_eq!(client.get_track(track.id).await.unwrap(), track);
    assert!(client.check_available(track.id).await.unwrap().available);

    let participant = ParticipantId::new();
    let debit = CapacityAdjustment::for_participant(track.id, participant, AdjustmentDirection::Decrement);
    let outcome = client.adjust_capacity(debit.clone()).await.unwrap();
    assert_eq!(outcome.remaining_capacity, 0);
    assert!(client.adjust_capacity(debit).await.unwrap().replayed);
    assert!(!client.check_available(track.id).await.unwrap().available);

    let other = CapacityAdjustment::for_participant(track.id, ParticipantId::new(), AdjustmentDirection::Decrement);
    assert_eq!(
        client.adjust_capacity(other).await,
        Err(StorageError::CapacityExhausted(track.id))
    );

    let found = client
        .list_tracks(TrackFilter {
            name: Some("network".into()),
            ..TrackFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(found.len(), 1);

    client.delete_track(track.id).await.unwrap();
    assert!(client.get_track(track.id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn client_maps_token_errors() {
    let client = client(spawn_track_service().await);
    let track = client.create_track(Track::new("T1", 3)).await.unwrap();
    let token = AdjustmentToken::new("p:debit");

    client
        .adjust_capacity(CapacityAdjustment {
            track_id: track.id,
            delta: -1,
            token: token.clone(),
        })
        .await
        .unwrap();
    let conflict = client
        .adjust_capacity(CapacityAdjustment {
            track_id: track.id,
            delta: 1,
            token: token.clone(),
        })
        .await;
    assert_eq!(conflict, Err(StorageError::TokenConflict { token: token.clone() }));

    let reverted = client.void_adjustment(track.id, token.clone()).await.unwrap();
    assert_eq!(reverted, VoidOutcome::Reverted { remaining_capacity: 3 });

    let barred_token = AdjustmentToken::new("q:debit");
    client.void_adjustment(track.id, barred_token.clone()).await.unwrap();
    let late = client
        .adjust_capacity(CapacityAdjustment {
            track_id: track.id,
            delta: -1,
            token: barred_token.clone(),
        })
        .await;
    assert_eq!(late, Err(StorageError::AdjustmentVoided(barred_token)));

    assert!(
        client
            .void_adjustment(TrackId::new(), token)
            .await
            .unwrap_err()
            .is_not_found()
    );
}

#[tokio::test]
async fn unreachable_track_service_is_transient() {
    // Bind then drop to get a port nothing listens on
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let err = client(addr).get_track(TrackId::new()).await.unwrap_err();
    assert!(err.is_transient(), "{err:?}");
}

#[tokio::test]
async fn undecodable_success_body_is_transient() {
    // The adjustment lands, but the answer is not an adjustment outcome
    let router = axum::Router::new().route(
        "/tracks/:id/adjust",
        axum::routing::post(|| async { (StatusCode::OK, "<html>gateway</html>") }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("stub service");
    });

    let debit = CapacityAdjustment::for_participant(
        TrackId::new(),
        ParticipantId::new(),
        AdjustmentDirection::Decrement,
    );
    let err = client(addr).adjust_capacity(debit).await.unwrap_err();
    assert!(err.is_transient(), "{err:?}");
    assert!(!err.is_rejection());
}

#[tokio::test]
async fn enrollment_over_a_remote_track_service() {
    let client = Arc::new(client(spawn_track_service().await));
    let track = client.create_track(Track::new("Distributed Systems", 2)).await.unwrap();

    let environment = CoordinatorEnvironment {
        tracks: client.clone(),
        capacity: client.clone(),
        participants: Arc::new(InMemoryParticipantStore::new()),
        reconciliations: Arc::new(InMemoryReconciliationLog::new()),
        clock: Arc::new(test_clock()),
        guard: CallGuard::new(
            RetryPolicy::builder()
                .max_retries(2)
                .initial_delay(Duration::from_millis(5))
                .build(),
            Duration::from_secs(2),
        ),
    };
    let server = TestServer::new(build_router(AppState::new(environment, "memory"))).unwrap();

    let enroll = |name: &'static str| {
        server
            .post("/participants")
            .json(&json!({ "name": name, "trackId": track.id }))
    };

    let a = enroll("A").await;
    a.assert_status(StatusCode::CREATED);
    let a: Participant = a.json();
    assert_eq!(a.lifecycle, Lifecycle::Active);
    enroll("B").await.assert_status(StatusCode::CREATED);

    let c = enroll("C").await;
    c.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(c.json::<Value>()["code"], "CAPACITY_EXHAUSTED");

    server
        .delete(&format!("/participants/{}", a.id))
        .await
        .assert_status_ok();
    enroll("D").await.assert_status(StatusCode::CREATED);

    assert_eq!(client.get_track(track.id).await.unwrap().remaining_capacity, 0);
    let active: Vec<Participant> = server
        .get("/participants")
        .add_query_param("trackId", track.id)
        .await
        .json();
    assert_eq!(active.len(), 2);
}
