//! End-to-end tests of the media server facade over the loopback engine

use mediagraph_object_core::{
    LoopbackConfig, LoopbackEngine, MediaObjectRef, MediaServer, MediaServerException, MediaServerService,
    MixerType, NegotiationState, SdpEndpointType, SignalKind, Token, UriState, EVENT_QUEUE_CAPACITY, VERSION,
};
use mediagraph_object_core::endpoint::EndpointState;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

fn server() -> (MediaServer, Arc<LoopbackEngine>) {
    MediaServer::with_loopback(LoopbackConfig::default())
}

async fn manager(server: &MediaServer) -> MediaObjectRef {
    server.create_media_manager(0).await.unwrap()
}

fn negotiation_state(server: &MediaServer, endpoint: MediaObjectRef) -> NegotiationState {
    match server.endpoint_state(endpoint.id, endpoint.token).unwrap() {
        EndpointState::Sdp(sdp) => sdp.state,
        other => panic!("not an SDP endpoint: {:?}", other),
    }
}

fn uri_state(server: &MediaServer, endpoint: MediaObjectRef) -> UriState {
    match server.endpoint_state(endpoint.id, endpoint.token).unwrap() {
        EndpointState::Uri(playback) => playback.state,
        other => panic!("not a URI endpoint: {:?}", other),
    }
}

#[tokio::test]
async fn test_version() {
    let (server, _) = server();
    assert_eq!(server.get_version(), VERSION);
}

#[tokio::test]
async fn test_children_share_manager_token() {
    let (server, _) = server();
    let mm = manager(&server).await;

    let mixer = server.create_mixer(mm.id, mm.token, MixerType::MainMixer).await.unwrap();
    let rtp = server
        .create_sdp_endpoint(mm.id, mm.token, SdpEndpointType::Rtp)
        .await
        .unwrap();
    let webrtc = server
        .create_sdp_endpoint(mm.id, mm.token, SdpEndpointType::WebRtc)
        .await
        .unwrap();

    assert_eq!(mixer.token, mm.token);
    assert_eq!(rtp.token, mm.token);
    assert_eq!(webrtc.token, mm.token);
    assert_eq!(mm.token, Token::from(mm.id));

    server.release(mm.id, mm.token).await.unwrap();
}

#[tokio::test]
async fn test_released_manager_is_not_found() {
    let (server, engine) = server();
    let mm = manager(&server).await;
    server.release(mm.id, mm.token).await.unwrap();

    let result = server.create_mixer(mm.id, mm.token, MixerType::MainMixer).await;
    assert!(matches!(result, Err(MediaServerException::MediaObjectNotFound { .. })));
    assert_eq!(engine.live_elements(), 0);
}

#[tokio::test]
async fn test_double_release_fails() {
    let (server, _) = server();
    let mm = manager(&server).await;
    server.release(mm.id, mm.token).await.unwrap();

    let err = server.release(mm.id, mm.token).await.unwrap_err();
    assert_eq!(err.code(), 1);
}

#[tokio::test]
async fn test_ancestor_release_hides_descendants() {
    let (server, engine) = server();
    let mm = manager(&server).await;
    let mixer = server.create_mixer(mm.id, mm.token, MixerType::MainMixer).await.unwrap();
    let endpoint = server
        .create_sdp_endpoint(mixer.id, mm.token, SdpEndpointType::Rtp)
        .await
        .unwrap();

    server.release(mm.id, mm.token).await.unwrap();

    for object in [mixer, endpoint] {
        let err = server.get_parent(object.id, object.token).await.unwrap_err();
        assert_eq!(err.name(), "MediaObjectNotFoundException");
    }
    assert!(matches!(
        server.generate_offer(endpoint.id, endpoint.token).await,
        Err(MediaServerException::MediaObjectNotFound { .. })
    ));
    assert_eq!(engine.released_elements(), 3);
}

#[tokio::test]
async fn test_parent_of_mixer_is_manager() {
    let (server, _) = server();
    let mm = manager(&server).await;
    let mixer = server.create_mixer(mm.id, mm.token, MixerType::MainMixer).await.unwrap();

    let parent = server.get_parent(mixer.id, mixer.token).await.unwrap();
    assert_eq!(parent.id, mm.id);

    server.release(mm.id, mm.token).await.unwrap();
}

#[tokio::test]
async fn test_manager_has_no_parent() {
    let (server, _) = server();
    let mm = manager(&server).await;

    let err = server.get_parent(mm.id, mm.token).await.unwrap_err();
    assert!(matches!(err, MediaServerException::NoParent { .. }));
    assert_eq!(err.code(), 2);

    server.release(mm.id, mm.token).await.unwrap();
}

#[tokio::test]
async fn test_foreign_token_is_not_found() {
    let (server, _) = server();
    let a = manager(&server).await;
    let b = manager(&server).await;
    let mixer = server.create_mixer(a.id, a.token, MixerType::MainMixer).await.unwrap();

    let err = server.get_parent(mixer.id, b.token).await.unwrap_err();
    assert!(matches!(err, MediaServerException::MediaObjectNotFound { .. }));
    assert_err!(server.release(mixer.id, b.token).await);
    assert_ok!(server.get_parent(mixer.id, a.token).await);
}

#[tokio::test]
async fn test_generate_offer_then_answer() {
    let (server, engine) = server();
    let mm = manager(&server).await;

    for endpoint_type in [SdpEndpointType::Rtp, SdpEndpointType::WebRtc] {
        let ep = server.create_sdp_endpoint(mm.id, mm.token, endpoint_type).await.unwrap();

        let offer = server.generate_offer(ep.id, ep.token).await.unwrap();
        assert!(offer.starts_with("v=0"));
        assert_eq!(negotiation_state(&server, ep), NegotiationState::OfferGenerated);
        assert_eq!(server.get_local_session_descriptor(ep.id, ep.token).await.unwrap(), offer);

        server.process_answer(ep.id, ep.token, "v=0\r\n".into()).await.unwrap();
        assert_eq!(negotiation_state(&server, ep), NegotiationState::AnswerProcessed);
        assert_eq!(
            server.get_remote_session_descriptor(ep.id, ep.token).await.unwrap(),
            "v=0\r\n"
        );
        assert!(engine.is_media_flowing(ep.id));
    }

    server.release(mm.id, mm.token).await.unwrap();
}

#[tokio::test]
async fn test_process_offer_generates_answer() {
    let (server, _) = server();
    let mm = manager(&server).await;
    let ep = server
        .create_sdp_endpoint(mm.id, mm.token, SdpEndpointType::WebRtc)
        .await
        .unwrap();

    let answer = server.process_offer(ep.id, ep.token, "remote".into()).await.unwrap();
    assert!(answer.contains("a=setup:active"));
    assert_eq!(negotiation_state(&server, ep), NegotiationState::AnswerGenerated);
    assert_eq!(
        server.get_remote_session_descriptor(ep.id, ep.token).await.unwrap(),
        "remote"
    );

    let err = server.generate_offer(ep.id, ep.token).await.unwrap_err();
    assert_eq!(err.code(), 3);
}

#[tokio::test]
async fn test_answer_before_offer_is_invalid_state() {
    let (server, _) = server();
    let mm = manager(&server).await;
    let ep = server
        .create_sdp_endpoint(mm.id, mm.token, SdpEndpointType::Rtp)
        .await
        .unwrap();

    let err = server.process_answer(ep.id, ep.token, "".into()).await.unwrap_err();
    assert!(matches!(err, MediaServerException::InvalidState { .. }));
    assert!(err.message().contains("CREATED"));
    assert_eq!(negotiation_state(&server, ep), NegotiationState::Created);

    let err = server.get_local_session_descriptor(ep.id, ep.token).await.unwrap_err();
    assert_eq!(err.code(), 3);
}

#[tokio::test]
async fn test_fixed_sdp_endpoints() {
    let (server, _) = server();
    let mm = manager(&server).await;

    for endpoint_type in [SdpEndpointType::Rtp, SdpEndpointType::WebRtc] {
        let ep = server
            .create_sdp_endpoint_with_fixed_sdp(mm.id, mm.token, endpoint_type, "fixed".into())
            .await
            .unwrap();
        assert_eq!(negotiation_state(&server, ep), NegotiationState::AnswerProcessed);

        assert_eq!(server.generate_offer(ep.id, ep.token).await.unwrap(), "fixed");
        assert_eq!(server.generate_offer(ep.id, ep.token).await.unwrap(), "fixed");
        assert_eq!(server.process_offer(ep.id, ep.token, "remote".into()).await.unwrap(), "fixed");
        server.process_answer(ep.id, ep.token, "answer".into()).await.unwrap();

        assert_eq!(negotiation_state(&server, ep), NegotiationState::AnswerProcessed);
        assert_eq!(
            server.get_remote_session_descriptor(ep.id, ep.token).await.unwrap(),
            "answer"
        );
    }
}

#[tokio::test]
async fn test_engine_failure_rolls_back_negotiation() {
    let (server, engine) = server();
    let mm = manager(&server).await;
    let ep = server
        .create_sdp_endpoint(mm.id, mm.token, SdpEndpointType::Rtp)
        .await
        .unwrap();

    engine.set_failing(true);
    let err = server.process_offer(ep.id, ep.token, "remote".into()).await.unwrap_err();
    assert_eq!(err.name(), "EngineFailureException");
    assert_eq!(negotiation_state(&server, ep), NegotiationState::Created);
    assert_err!(server.get_remote_session_descriptor(ep.id, ep.token).await);

    engine.set_failing(false);
    assert_ok!(server.process_offer(ep.id, ep.token, "remote".into()).await);
}

#[tokio::test]
async fn test_engine_failure_on_answer_restores_offer_generated() {
    let (server, engine) = server();
    let mm = manager(&server).await;
    let ep = server
        .create_sdp_endpoint(mm.id, mm.token, SdpEndpointType::WebRtc)
        .await
        .unwrap();
    let offer = server.generate_offer(ep.id, ep.token).await.unwrap();

    engine.set_failing(true);
    let err = server.process_answer(ep.id, ep.token, "answer".into()).await.unwrap_err();
    assert_eq!(err.code(), 4);
    assert_eq!(negotiation_state(&server, ep), NegotiationState::OfferGenerated);
    assert_err!(server.get_remote_session_descriptor(ep.id, ep.token).await);
    assert_eq!(server.get_local_session_descriptor(ep.id, ep.token).await.unwrap(), offer);
    assert!(!engine.is_media_flowing(ep.id));

    engine.set_failing(false);
    assert_ok!(server.process_answer(ep.id, ep.token, "answer".into()).await);
    assert_eq!(negotiation_state(&server, ep), NegotiationState::AnswerProcessed);
    assert!(engine.is_media_flowing(ep.id));
}

#[tokio::test]
async fn test_negotiation_on_mixer_is_invalid_state() {
    let (server, _) = server();
    let mm = manager(&server).await;
    let mixer = server.create_mixer(mm.id, mm.token, MixerType::MainMixer).await.unwrap();

    let err = server.generate_offer(mixer.id, mixer.token).await.unwrap_err();
    assert!(matches!(err, MediaServerException::InvalidState { .. }));
    assert!(err.message().contains("UNSUPPORTED"));
}

#[tokio::test]
async fn test_player_end_of_stream_is_restartable() {
    let (server, engine) = server();
    let mm = manager(&server).await;
    let player = server
        .create_player_endpoint(mm.id, mm.token, "file:///media/clip.webm".into(), false)
        .await
        .unwrap();

    server.play(player.id, player.token).await.unwrap();
    assert_eq!(uri_state(&server, player), UriState::Playing);
    assert_eq!(engine.active_uri(player.id).as_deref(), Some("file:///media/clip.webm"));

    assert_eq!(engine.emit(player.id, SignalKind::EndOfStream), 1);
    assert_eq!(uri_state(&server, player), UriState::Eos);

    server.play(player.id, player.token).await.unwrap();
    assert_eq!(uri_state(&server, player), UriState::Playing);
    // Restart does not arm a second set of subscriptions
    assert_eq!(server.signals().subscription_count(), 3);

    server.stop(player.id, player.token).await.unwrap();
    assert_eq!(uri_state(&server, player), UriState::Idle);
    assert_eq!(engine.active_uri(player.id), None);
}

#[tokio::test]
async fn test_player_invalid_uri_is_terminal() {
    let (server, engine) = server();
    let mm = manager(&server).await;
    let player = server
        .create_player_endpoint(mm.id, mm.token, "bogus://".into(), false)
        .await
        .unwrap();

    server.play(player.id, player.token).await.unwrap();
    engine.emit(player.id, SignalKind::InvalidUri);
    assert_eq!(uri_state(&server, player), UriState::Error);

    let err = server.play(player.id, player.token).await.unwrap_err();
    assert!(matches!(err, MediaServerException::InvalidState { .. }));
    assert_err!(server.stop(player.id, player.token).await);
}

#[tokio::test]
async fn test_play_twice_is_invalid_state() {
    let (server, _) = server();
    let mm = manager(&server).await;
    let player = server
        .create_player_endpoint(mm.id, mm.token, "file:///a".into(), true)
        .await
        .unwrap();

    server.play(player.id, player.token).await.unwrap();
    let err = server.play(player.id, player.token).await.unwrap_err();
    assert!(err.message().contains("PLAYING"));
}

#[tokio::test]
async fn test_recorder_records_but_does_not_play() {
    let (server, engine) = server();
    let mm = manager(&server).await;
    let recorder = server
        .create_recorder_endpoint(mm.id, mm.token, "file:///tmp/out.webm".into())
        .await
        .unwrap();

    let err = server.play(recorder.id, recorder.token).await.unwrap_err();
    assert!(err.message().contains("UNSUPPORTED"));

    server.record(recorder.id, recorder.token).await.unwrap();
    assert_eq!(uri_state(&server, recorder), UriState::Playing);
    assert_eq!(engine.active_uri(recorder.id).as_deref(), Some("file:///tmp/out.webm"));
}

#[tokio::test]
async fn test_engine_failure_on_play_restores_idle() {
    let (server, engine) = server();
    let mm = manager(&server).await;
    let player = server
        .create_player_endpoint(mm.id, mm.token, "file:///a".into(), false)
        .await
        .unwrap();

    engine.set_failing(true);
    let err = server.play(player.id, player.token).await.unwrap_err();
    assert_eq!(err.code(), 4);
    assert_eq!(uri_state(&server, player), UriState::Idle);
}

#[tokio::test]
async fn test_client_subscription_receives_events() {
    let (server, engine) = server();
    let mm = manager(&server).await;
    let player = server
        .create_player_endpoint(mm.id, mm.token, "file:///a".into(), false)
        .await
        .unwrap();

    let mut subscription = server
        .subscribe(player.id, player.token, SignalKind::EndOfStream)
        .await
        .unwrap();

    server.play(player.id, player.token).await.unwrap();
    assert_eq!(engine.emit(player.id, SignalKind::EndOfStream), 2);

    let event = subscription.events.try_recv().unwrap();
    assert_eq!(event.object, player.id);
    assert_eq!(event.kind, SignalKind::EndOfStream);
    assert!(subscription.events.try_recv().is_err());

    assert!(server.unsubscribe(player.id, player.token, subscription.handle).await.unwrap());
    assert!(!server.unsubscribe(player.id, player.token, subscription.handle).await.unwrap());
}

#[tokio::test]
async fn test_no_signal_delivery_after_release() {
    let (server, engine) = server();
    let mm = manager(&server).await;
    let player = server
        .create_player_endpoint(mm.id, mm.token, "file:///a".into(), false)
        .await
        .unwrap();

    let mut subscription = server
        .subscribe(player.id, player.token, SignalKind::InvalidMedia)
        .await
        .unwrap();
    server.play(player.id, player.token).await.unwrap();
    server.release(mm.id, mm.token).await.unwrap();

    assert_eq!(engine.emit(player.id, SignalKind::InvalidMedia), 0);
    assert!(subscription.events.try_recv().is_err());
    assert_eq!(server.signals().subscription_count(), 0);
    let err = server
        .unsubscribe(player.id, player.token, subscription.handle)
        .await
        .unwrap_err();
    assert!(matches!(err, MediaServerException::MediaObjectNotFound { .. }));
}

#[tokio::test]
async fn test_unsubscribe_requires_owning_object() {
    let (server, _) = server();
    let a = manager(&server).await;
    let b = manager(&server).await;
    let player = server
        .create_player_endpoint(a.id, a.token, "file:///a".into(), false)
        .await
        .unwrap();
    let subscription = server
        .subscribe(player.id, player.token, SignalKind::EndOfStream)
        .await
        .unwrap();

    // Another tree's own object cannot cancel it
    let err = server.unsubscribe(b.id, b.token, subscription.handle).await.unwrap_err();
    assert!(matches!(err, MediaServerException::MediaObjectNotFound { .. }));
    // Nor can the right id with a foreign token
    let err = server
        .unsubscribe(player.id, b.token, subscription.handle)
        .await
        .unwrap_err();
    assert!(matches!(err, MediaServerException::MediaObjectNotFound { .. }));

    assert!(server.signals().is_subscribed(subscription.handle));
    assert!(server.unsubscribe(player.id, player.token, subscription.handle).await.unwrap());
}

#[tokio::test]
async fn test_full_event_queue_drops_further_signals() {
    let (server, engine) = server();
    let mm = manager(&server).await;
    let player = server
        .create_player_endpoint(mm.id, mm.token, "file:///a".into(), false)
        .await
        .unwrap();
    let mut subscription = server
        .subscribe(player.id, player.token, SignalKind::EndOfStream)
        .await
        .unwrap();

    for _ in 0..EVENT_QUEUE_CAPACITY + 10 {
        engine.emit(player.id, SignalKind::EndOfStream);
    }

    let mut queued = 0;
    while subscription.events.try_recv().is_ok() {
        queued += 1;
    }
    assert_eq!(queued, EVENT_QUEUE_CAPACITY);
}

#[tokio::test]
async fn test_subscribe_with_wrong_token_is_not_found() {
    let (server, _) = server();
    let a = manager(&server).await;
    let b = manager(&server).await;

    let err = server
        .subscribe(a.id, b.token, SignalKind::EndOfStream)
        .await
        .unwrap_err();
    assert_eq!(err.code(), 1);
}
