//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//


//! Copyover preparation and recovery without an exec

use pulsemud_service::{
    ConnectionId, ConnectionState, CredentialHasher, Engine, EngineConfig, EngineError, Gender, Level,
    MemoryPeer, MemoryStore, MemoryTransport, PlayerRecord, Result, Transport, encode_transfer,
    TransferRecord,
};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::path::Path;
use std::sync::Arc;

struct PlainHasher;

impl CredentialHasher for PlainHasher {
    fn hash(&self, password: &str) -> Result<String> {
        Ok(format!("plain:{password}"))
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        hash == format!("plain:{password}")
    }
}

fn record(name: &str) -> PlayerRecord {
    PlayerRecord {
        name: name.to_string(),
        password_hash: "plain:hunter22".to_string(),
        level: Level::Player,
        gender: Gender::Male,
    }
}

fn config(transfer: &Path) -> EngineConfig {
    EngineConfig::default()
        .with_hostname_lookup(false)
        .with_compression(false, false)
        .with_copyover_file(transfer)
}

fn engine(store: Arc<MemoryStore>, transfer: &Path) -> Engine {
    engine_with(store, config(transfer))
}

fn engine_with(store: Arc<MemoryStore>, config: EngineConfig) -> Engine {
    Engine::builder(config)
        .store(store)
        .hasher(Arc::new(PlainHasher))
        .build()
        .unwrap()
}

fn connect(engine: &mut Engine, fd: RawFd, port: u16) -> (ConnectionId, MemoryPeer) {
    let (transport, peer) = MemoryTransport::with_descriptor(fd);
    let id = engine
        .accept(Box::new(transport), SocketAddr::from(([10, 0, 0, 7], port)))
        .unwrap();
    (id, peer)
}

async fn login(engine: &mut Engine, fd: RawFd, name: &str) -> (ConnectionId, MemoryPeer) {
    let (id, peer) = connect(engine, fd, 5000 + fd as u16);
    peer.send(format!("{name}\r\nhunter22\r\n"));
    engine.pulse().await;
    engine.pulse().await;
    assert_eq!(
        engine.connection(id).map(|conn| conn.state()),
        Some(ConnectionState::Playing)
    );
    peer.received();
    (id, peer)
}

#[tokio::test]
async fn test_prepare_writes_playing_connections() {
    let dir = tempfile::tempdir().unwrap();
    let transfer = dir.path().join("copyover.dat");
    let store = Arc::new(MemoryStore::with_players([record("Alice"), record("Bob")]));
    let mut engine = engine(store.clone(), &transfer);

    let (alice_id, alice) = login(&mut engine, 10, "alice").await;
    let (_, bob) = login(&mut engine, 11, "bob").await;
    let (_, stranger) = connect(&mut engine, 12, 6000);
    engine.pulse().await;
    stranger.received();
    engine
        .connection_mut(alice_id)
        .unwrap()
        .session_mut()
        .unwrap()
        .set_gender(Gender::Female);

    let records = engine.prepare_copyover(alice_id).await.unwrap();
    assert_eq!(
        records,
        vec![
            TransferRecord {
                descriptor: 10,
                name: "Alice".to_string(),
                state: ConnectionState::Playing,
                hostname: "10.0.0.7".to_string(),
            },
            TransferRecord {
                descriptor: 11,
                name: "Bob".to_string(),
                state: ConnectionState::Playing,
                hostname: "10.0.0.7".to_string(),
            },
        ]
    );

    assert!(alice.received_text().contains("The world starts spinning."));
    assert!(bob.received_text().contains("The world starts spinning."));
    assert!(!alice.is_disconnected());
    assert!(stranger.received_text().contains("Sorry, we are rebooting."));
    assert!(stranger.is_disconnected());
    assert_eq!(store.get("alice").unwrap().gender, Gender::Female);

    let written = std::fs::read_to_string(&transfer).unwrap();
    assert_eq!(written, "10 Alice playing 10.0.0.7\n11 Bob playing 10.0.0.7\nEOF\n");
}

#[tokio::test]
async fn test_connection_without_descriptor_is_rebooted() {
    let dir = tempfile::tempdir().unwrap();
    let transfer = dir.path().join("copyover.dat");
    let store = Arc::new(MemoryStore::with_players([record("Alice")]));
    let mut engine = engine(store, &transfer);

    let (transport, peer) = MemoryTransport::pair();
    let id = engine
        .accept(Box::new(transport), SocketAddr::from(([10, 0, 0, 7], 7000)))
        .unwrap();
    peer.send("alice\r\nhunter22\r\n");
    engine.pulse().await;
    engine.pulse().await;

    let records = engine.prepare_copyover(id).await.unwrap();
    assert!(records.is_empty());
    assert!(peer.is_disconnected());
    assert!(engine.linkdead().is_empty());
    assert_eq!(
        std::fs::read_to_string(&transfer).unwrap(),
        "EOF\n"
    );
}

#[tokio::test]
async fn test_unwritable_transfer_file_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let transfer = dir.path().join("missing").join("copyover.dat");
    let store = Arc::new(MemoryStore::with_players([record("Alice")]));
    let mut engine = engine(store, &transfer);
    let (id, alice) = login(&mut engine, 10, "alice").await;

    assert!(engine.prepare_copyover(id).await.is_err());
    engine.pulse().await;
    assert!(alice.received_text().contains("Copyover file not writeable, aborted."));
    assert!(!alice.is_disconnected());
}

#[tokio::test]
async fn test_prepare_drains_slow_clients() {
    let dir = tempfile::tempdir().unwrap();
    let transfer = dir.path().join("copyover.dat");
    let store = Arc::new(MemoryStore::with_players([record("Alice")]));
    let mut engine = engine(store, &transfer);
    let (id, alice) = login(&mut engine, 10, "alice").await;

    alice.set_write_limit(Some(8));
    let records = engine.prepare_copyover(id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(engine.connection(id).map(|conn| conn.wire_backlog()), Some(0));
    assert!(alice
        .received_text()
        .ends_with("The world starts spinning.\r\n"));
}

#[tokio::test]
async fn test_failed_exec_keeps_serving() {
    let dir = tempfile::tempdir().unwrap();
    let transfer = dir.path().join("copyover.dat");
    let store = Arc::new(MemoryStore::with_players([record("Alice"), record("Bob")]));
    let config = config(&transfer).with_executable(dir.path().join("no-such-binary"));
    let mut engine = engine_with(store, config);
    // descriptors that are not open in this process
    let (alice_id, alice) = login(&mut engine, 900, "alice").await;
    let (bob_id, bob) = login(&mut engine, 901, "bob").await;

    let result = engine.copyover(alice_id, None).await;
    assert!(matches!(result, Err(EngineError::Copyover(_))));
    assert!(!transfer.exists());

    engine.pulse().await;
    let text = alice.received_text();
    assert!(text.contains("The world starts spinning."));
    assert!(text.contains("Copyover FAILED!"));
    for id in [alice_id, bob_id] {
        assert_eq!(
            engine.connection(id).map(|conn| conn.state()),
            Some(ConnectionState::Playing)
        );
    }

    bob.send("say still here\r\n");
    engine.pulse().await;
    assert!(alice.received_text().contains("Bob says 'still here'."));
    assert!(!alice.is_disconnected());
}

#[tokio::test]
async fn test_recover_reattaches_players() {
    let dir = tempfile::tempdir().unwrap();
    let transfer = dir.path().join("copyover.dat");
    let store = Arc::new(MemoryStore::with_players([
        record("Alice"),
        record("Bob"),
        record("Carol"),
    ]));

    let mut before = engine(store.clone(), &transfer);
    let (alice_id, _alice) = login(&mut before, 10, "alice").await;
    let _bob = login(&mut before, 11, "bob").await;
    let _carol = login(&mut before, 12, "carol").await;
    let records = before.prepare_copyover(alice_id).await.unwrap();
    assert_eq!(records.len(), 3);
    drop(before);

    let mut after = engine(store, &transfer);
    let mut peers: HashMap<RawFd, MemoryPeer> = HashMap::new();
    let restored = after
        .recover_copyover(&transfer, |fd| {
            let (transport, peer) = MemoryTransport::with_descriptor(fd);
            peers.insert(fd, peer);
            Ok(Box::new(transport) as Box<dyn Transport>)
        })
        .await
        .unwrap();
    assert_eq!(restored, 3);
    assert!(!transfer.exists());

    let mut names: Vec<String> = after
        .connections()
        .filter(|conn| conn.state() == ConnectionState::Playing)
        .filter_map(|conn| conn.session().map(|session| session.name().to_string()))
        .collect();
    names.sort();
    assert_eq!(names, vec!["Alice", "Bob", "Carol"]);
    assert!(after.connections().all(|conn| conn.host() == "10.0.0.7"));
    assert!(after.connections().all(|conn| conn.descriptor().is_some()));

    after.pulse().await;
    let alice = &peers[&10];
    assert!(alice
        .received_text()
        .contains("And before you know it, everything has changed."));

    alice.send("say back\r\n");
    after.pulse().await;
    assert!(peers[&11].received_text().contains("Alice says 'back'."));
    assert!(peers[&12].received_text().contains("Alice says 'back'."));
}

#[tokio::test]
async fn test_recover_drops_unusable_records() {
    let dir = tempfile::tempdir().unwrap();
    let transfer = dir.path().join("copyover.dat");
    let store = Arc::new(MemoryStore::with_players([record("Alice"), record("Bob")]));
    let playing = |descriptor: RawFd, name: &str| TransferRecord {
        descriptor,
        name: name.to_string(),
        state: ConnectionState::Playing,
        hostname: "10.0.0.7".to_string(),
    };
    let text = encode_transfer(&[playing(20, "Alice"), playing(21, "Ghost"), playing(22, "Bob")]);
    std::fs::write(&transfer, text).unwrap();

    let mut engine = engine(store, &transfer);
    let mut opened = Vec::new();
    let restored = engine
        .recover_copyover(&transfer, |fd| {
            if fd == 22 {
                return Err(io::Error::from(io::ErrorKind::NotConnected));
            }
            let (transport, peer) = MemoryTransport::with_descriptor(fd);
            opened.push((fd, peer));
            Ok(Box::new(transport) as Box<dyn Transport>)
        })
        .await
        .unwrap();

    assert_eq!(restored, 1);
    assert_eq!(engine.snapshot().playing, 1);
    let ghost = opened.iter().find(|(fd, _)| *fd == 21).map(|(_, peer)| peer);
    assert!(ghost.is_some_and(MemoryPeer::is_disconnected));
}

#[tokio::test]
async fn test_recover_without_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let transfer = dir.path().join("copyover.dat");
    let mut engine = engine(Arc::new(MemoryStore::new()), &transfer);
    let result = engine
        .recover_copyover(&transfer, |_| -> io::Result<Box<dyn Transport>> {
            Err(io::Error::from(io::ErrorKind::NotFound))
        })
        .await;
    assert!(result.is_err());
}
