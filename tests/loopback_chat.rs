use std::time::Duration;

use roulette_client::controller::{ChatHandle, ControllerConfig};
use roulette_client::service::LoopbackHub;
use roulette_client::session::{MessageSender, SessionPhase};

fn fast_config() -> ControllerConfig {
    ControllerConfig {
        retry_delay: Duration::from_millis(50),
    }
}

async fn wait_phase(handle: &mut ChatHandle, phase: SessionPhase) {
    handle
        .snapshot
        .wait_for(|s| s.phase == phase)
        .await
        .expect("controller task gone");
}

#[tokio::test]
async fn two_clients_meet_chat_and_part() {
    let hub = LoopbackHub::new(Duration::from_secs(5));
    // start with a flaky matchmaker: the first attempts fail and are retried
    hub.inject_request_failures(2).await;

    let mut alice = ChatHandle::spawn(Box::new(hub.endpoint().await), &fast_config());
    let mut bob = ChatHandle::spawn(Box::new(hub.endpoint().await), &fast_config());

    wait_phase(&mut alice, SessionPhase::Connected).await;
    wait_phase(&mut bob, SessionPhase::Connected).await;
    assert!(alice.current().remote_stream.is_some());
    assert!(bob.current().remote_stream.is_some());

    alice.send_message("hi!").await;
    let seen = bob
        .snapshot
        .wait_for(|s| !s.messages.is_empty())
        .await
        .unwrap()
        .clone();
    assert_eq!(seen.messages[0].sender, MessageSender::Remote);
    assert_eq!(seen.messages[0].text, "hi!");

    bob.send_message("hello").await;
    // alice's own line is already in her list, the reply lands after it
    let seen = alice
        .snapshot
        .wait_for(|s| s.messages.len() == 2)
        .await
        .unwrap()
        .clone();
    assert_eq!(seen.messages[0].sender, MessageSender::Local);
    assert_eq!(seen.messages[1].sender, MessageSender::Remote);
    assert_eq!(seen.messages[1].text, "hello");

    alice.end().await;
    bob.end().await;
    alice.join().await.unwrap();
    bob.join().await.unwrap();
}

#[tokio::test]
async fn skip_drops_partner_and_finds_a_new_one() {
    let hub = LoopbackHub::new(Duration::from_secs(5));
    let mut alice = ChatHandle::spawn(Box::new(hub.endpoint().await), &fast_config());
    let mut bob = ChatHandle::spawn(Box::new(hub.endpoint().await), &fast_config());

    wait_phase(&mut alice, SessionPhase::Connected).await;
    wait_phase(&mut bob, SessionPhase::Connected).await;
    let first_partner = alice.current().peer;

    alice.send_message("anyone there?").await;
    bob.snapshot
        .wait_for(|s| !s.messages.is_empty())
        .await
        .unwrap();

    // alice moves on; bob is told his partner left and has to skip too
    alice.skip().await;
    wait_phase(&mut bob, SessionPhase::Disconnected).await;
    assert!(bob.current().messages.is_empty());
    bob.skip().await;

    wait_phase(&mut alice, SessionPhase::Connected).await;
    wait_phase(&mut bob, SessionPhase::Connected).await;
    assert!(alice.current().messages.is_empty());
    // with only two endpoints on the hub they meet again
    assert_eq!(alice.current().peer, first_partner);

    alice.end().await;
    bob.end().await;
    alice.join().await.unwrap();
    bob.join().await.unwrap();
}

#[tokio::test]
async fn partner_leaving_requires_explicit_rematch() {
    let hub = LoopbackHub::new(Duration::from_millis(500));
    let mut alice = ChatHandle::spawn(Box::new(hub.endpoint().await), &fast_config());
    let mut bob = ChatHandle::spawn(Box::new(hub.endpoint().await), &fast_config());

    wait_phase(&mut alice, SessionPhase::Connected).await;
    wait_phase(&mut bob, SessionPhase::Connected).await;

    alice.end().await;
    alice.join().await.unwrap();

    // bob learns his partner is gone and stays parked there
    wait_phase(&mut bob, SessionPhase::Disconnected).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(bob.current().phase, SessionPhase::Disconnected);

    bob.end().await;
    bob.join().await.unwrap();
}
