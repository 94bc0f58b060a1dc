// tests/music_service_tests.rs
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mockall::mock;
use tokio::sync::mpsc;
use twilight_model::id::Id;

use maowbeat_common::models::{CommandOutcome, PlaybackNotice, PlaybackState, ResolvedTrack};
use maowbeat_common::traits::TrackResolver;
use maowbeat_core::eventbus::MusicEvent;
use maowbeat_core::services::{MusicCommand, MusicService, RequestContext};
use maowbeat_core::test_utils::helpers::*;
use maowbeat_core::Error;

mock! {
    Resolver {}
    #[async_trait]
    impl TrackResolver for Resolver {
        async fn resolve(&self, query: &str) -> Result<ResolvedTrack, Error>;
    }
}

fn ctx_in_voice() -> RequestContext {
    RequestContext {
        guild_id: Id::new(10),
        user_id: Id::new(20),
        voice_channel: Some(Id::new(30)),
    }
}

async fn service_with(
    resolver: MockResolver,
) -> (MusicService, Arc<ManualTransport>, mpsc::Receiver<MusicEvent>) {
    let transport = Arc::new(ManualTransport::new());
    let (registry, events) =
        setup_registry(Arc::new(resolver), transport.clone(), test_config(Duration::from_secs(30))).await;
    (MusicService::new(registry), transport, events)
}

#[tokio::test]
async fn test_play_searches_with_prefix() -> Result<(), Error> {
    let mut resolver = MockResolver::new();
    resolver
        .expect_resolve()
        .withf(|q: &str| q == "ytsearch:lofi beats")
        .times(1)
        .returning(|_| Ok(track("lofi beats")));
    let (service, transport, mut events) = service_with(resolver).await;
    let ctx = ctx_in_voice();

    assert_eq!(service.play(&ctx, "  lofi beats ").await?, CommandOutcome::Started);
    wait_for_notice(&mut events, |n| matches!(n, PlaybackNotice::NowPlaying(_))).await;
    assert_eq!(transport.played(), vec!["lofi beats"]);

    assert_eq!(service.stop(ctx.guild_id).await?, CommandOutcome::Stopped);
    Ok(())
}

#[tokio::test]
async fn test_play_validates_requester() -> Result<(), Error> {
    let mut resolver = MockResolver::new();
    resolver.expect_resolve().never();
    let (service, transport, _events) = service_with(resolver).await;

    let mut ctx = ctx_in_voice();
    assert!(matches!(service.play(&ctx, "   ").await, Err(Error::InvalidRequest(_))));

    ctx.voice_channel = None;
    assert!(matches!(service.play(&ctx, "song").await, Err(Error::NotInVoice)));

    assert!(transport.calls().is_empty());
    assert!(service.registry().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_commands_without_session_are_invalid_state() -> Result<(), Error> {
    let resolver = MockResolver::new();
    let (service, _transport, _events) = service_with(resolver).await;
    let guild = ctx_in_voice().guild_id;

    for res in [
        service.pause(guild).await,
        service.resume(guild).await,
        service.skip(guild).await,
        service.stop(guild).await,
    ] {
        assert!(matches!(res, Err(Error::InvalidState(_))), "{res:?}");
    }

    match service.queue_status(guild).await? {
        CommandOutcome::Status(status) => {
            assert_eq!(status.state, PlaybackState::Idle);
            assert_eq!(status.length, 0);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(service.registry().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_resolver_error_surfaces_as_failed_notice() -> Result<(), Error> {
    let mut resolver = MockResolver::new();
    resolver
        .expect_resolve()
        .times(1)
        .returning(|_| Err(Error::Resolution("Sign in to confirm your age".into())));
    let (service, _transport, mut events) = service_with(resolver).await;
    let ctx = ctx_in_voice();

    service.play(&ctx, "restricted").await?;
    match next_notice(&mut events).await {
        PlaybackNotice::Failed { reason } => assert!(reason.starts_with("Error playing song:"), "{reason}"),
        other => panic!("expected Failed, got {other:?}"),
    }
    match service.queue_status(ctx.guild_id).await? {
        CommandOutcome::Status(status) => assert_eq!(status.state, PlaybackState::Draining),
        other => panic!("unexpected outcome {other:?}"),
    }
    service.stop(ctx.guild_id).await?;
    Ok(())
}

#[tokio::test]
async fn test_non_resolution_errors_are_normalised() -> Result<(), Error> {
    let mut resolver = MockResolver::new();
    resolver
        .expect_resolve()
        .returning(|_| Err(Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "yt-dlp"))));
    let (service, _transport, mut events) = service_with(resolver).await;
    let ctx = ctx_in_voice();

    service.play(&ctx, "anything").await?;
    match next_notice(&mut events).await {
        PlaybackNotice::Failed { reason } => assert!(reason.starts_with("Error playing song:"), "{reason}"),
        other => panic!("expected Failed, got {other:?}"),
    }
    service.stop(ctx.guild_id).await?;
    Ok(())
}

#[tokio::test]
async fn test_chat_commands_drive_the_service() -> Result<(), Error> {
    let mut resolver = MockResolver::new();
    resolver.expect_resolve().returning(|q| Ok(track(q.trim_start_matches("ytsearch:"))));
    let (service, _transport, mut events) = service_with(resolver).await;
    let ctx = ctx_in_voice();

    let run = |line: &str| MusicCommand::parse(line).expect("should parse");

    assert_eq!(run("!p first").execute(&service, &ctx).await.expect("not help")?, CommandOutcome::Started);
    wait_for_notice(&mut events, |n| matches!(n, PlaybackNotice::NowPlaying(_))).await;
    assert_eq!(
        run("!play second").execute(&service, &ctx).await.expect("not help")?,
        CommandOutcome::Queued { position: 1 }
    );
    assert_eq!(run("!pause").execute(&service, &ctx).await.expect("not help")?, CommandOutcome::Paused);
    assert_eq!(run("!resume").execute(&service, &ctx).await.expect("not help")?, CommandOutcome::Resumed);
    assert_eq!(run("!next").execute(&service, &ctx).await.expect("not help")?, CommandOutcome::Skipped);
    assert!(run("!help").execute(&service, &ctx).await.is_none());
    assert_eq!(run("!leave").execute(&service, &ctx).await.expect("not help")?, CommandOutcome::Stopped);
    Ok(())
}
