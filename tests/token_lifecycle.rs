mod support;

use filedrop_provision::cli::check::{inspect, Status};
use filedrop_provision::core::pipeline::{Pipeline, RunContext};
use filedrop_provision::core::store::MemoryEntry;
use filedrop_provision::core::token::TokenManager;
use filedrop_provision::error::ProvisionError;
use support::World;

fn deploy(world: &World) {
    let host = world.host();
    let ctx = RunContext {
        target: &world.target,
        app: &world.app,
        host: &host,
        hardening: true,
    };
    Pipeline::standard().run(&ctx, |_| {}).unwrap();
}

fn is_token(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

#[test]
fn test_print_rotate_print() {
    let world = World::new();
    deploy(&world);
    let host = world.host();
    let tokens = TokenManager::new(&world.target, &host);

    let t1 = tokens.print().unwrap();
    assert!(is_token(t1.as_str()));

    let t2 = tokens.rotate().unwrap();
    assert_ne!(t1.as_str(), t2.as_str());
    assert_eq!(tokens.print().unwrap().as_str(), t2.as_str());

    let overlay = world.overlay().unwrap();
    assert!(overlay.contains(t2.as_str()));
    assert!(!overlay.contains(t1.as_str()));
}

#[test]
fn test_rotate_reloads_then_restarts() {
    let world = World::new();
    deploy(&world);
    world.clear_calls();

    let host = world.host();
    TokenManager::new(&world.target, &host).rotate().unwrap();
    assert_eq!(
        world.calls(),
        vec![
            "supervisor.daemon-reload".to_string(),
            format!("supervisor.restart {}", world.target.unit_name()),
        ]
    );
}

#[test]
fn test_print_before_issue_is_not_found() {
    let world = World::new();
    let host = world.host();
    match TokenManager::new(&world.target, &host).print() {
        Err(ProvisionError::TokenNotFound(path)) => assert_eq!(path, world.target.token_file),
        other => panic!("expected TokenNotFound, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_token_file_shape_and_mode() {
    let world = World::new();
    let host = world.host();
    let token = TokenManager::new(&world.target, &host).rotate().unwrap();

    match world.store.get(&world.target.token_file) {
        Some(MemoryEntry::File { contents, mode }) => {
            assert_eq!(contents, format!("{}\n", token.as_str()));
            assert_eq!(contents.lines().count(), 1);
            assert_eq!(mode, 0o600);
        }
        other => panic!("unexpected token entry {:?}", other),
    }
    match world.store.get(&world.paths.overlay_file(&world.target)) {
        Some(MemoryEntry::File { mode, .. }) => assert_eq!(mode, 0o600),
        other => panic!("unexpected overlay entry {:?}", other),
    }
}

#[test]
fn test_failed_restart_restores_previous_token() {
    let world = World::new();
    deploy(&world);
    let before_token = world.token_file().unwrap();
    let before_overlay = world.overlay().unwrap();

    world.restart_fails.set(true);
    world.clear_calls();
    let host = world.host();
    let tokens = TokenManager::new(&world.target, &host);
    assert!(tokens.rotate().is_err());

    assert_eq!(world.token_file().unwrap(), before_token);
    assert_eq!(world.overlay().unwrap(), before_overlay);
    // The restored overlay is reloaded so systemd sees the old token again.
    assert_eq!(world.calls().last().unwrap(), "supervisor.daemon-reload");
}

#[test]
fn test_failed_overlay_write_restores_token_file() {
    let world = World::new();
    deploy(&world);
    let before = world.token_file().unwrap();

    world
        .store
        .fail_writes_to(world.paths.overlay_file(&world.target));
    world.clear_calls();
    let host = world.host();
    assert!(TokenManager::new(&world.target, &host).rotate().is_err());
    assert_eq!(world.token_file().unwrap(), before);
    assert!(world.calls_to("supervisor.restart").is_empty());
}

#[test]
fn test_failed_first_issue_leaves_nothing_behind() {
    let world = World::new();
    world.restart_fails.set(true);
    let host = world.host();
    assert!(TokenManager::new(&world.target, &host).rotate().is_err());
    assert!(world.token_file().is_none());
    assert!(world.overlay().is_none());
}

#[test]
fn test_deploy_replaces_malformed_token() {
    let world = World::new();
    world
        .store
        .insert(world.target.token_file.clone(), "not-a-token\n", 0o600);
    deploy(&world);

    let raw = world.token_file().unwrap();
    assert!(is_token(raw.trim_end()));
}

#[test]
fn test_print_rejects_malformed_token() {
    let world = World::new();
    world
        .store
        .insert(world.target.token_file.clone(), "ABCDEF\n", 0o600);
    let host = world.host();
    assert!(matches!(
        TokenManager::new(&world.target, &host).print(),
        Err(ProvisionError::MalformedToken { .. })
    ));
}

#[test]
fn test_inspect_after_deploy_and_drift() {
    let world = World::new();
    deploy(&world);
    let host = world.host();

    let rows = inspect(&world.target, &host);
    assert!(
        rows.iter().all(|r| r.status == Status::Pass),
        "{:?}",
        rows
    );

    // Overlay from some other token: the running service and the file disagree.
    world.store.insert(
        world.paths.overlay_file(&world.target),
        "[Service]\nEnvironment=\"UPLOAD_TOKEN=0000\"\n",
        0o600,
    );
    let rows = inspect(&world.target, &host);
    let overlay = rows.iter().find(|r| r.check == "token overlay").unwrap();
    assert_eq!(overlay.status, Status::Fail);
}
