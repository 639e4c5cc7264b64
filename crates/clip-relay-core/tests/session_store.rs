use clip_relay_core::media::selector::finalize_options;
use clip_relay_core::{Choice, JobError, Selector, Session, SessionId, SessionStore, SourceUrl};
use std::sync::Arc;
use std::time::Duration;

fn session(chat_id: i64, message_id: i32) -> Result<Session, JobError> {
    Ok(Session::new(
        SessionId::from_message(chat_id, message_id),
        SourceUrl::parse("https://example.com/watch?v=1")?,
        None,
        finalize_options([720, 480, 360]),
    ))
}

#[tokio::test]
async fn concurrent_consume_succeeds_exactly_once() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(SessionStore::new(Duration::from_secs(60), 1000));
    let id = store.create(session(100, 1)?).await;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let store = store.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move { store.consume(&id).await.is_some() }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await? {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
    assert!(store.consume(&id).await.is_none());
    Ok(())
}

#[tokio::test]
async fn expired_session_is_gone() -> Result<(), Box<dyn std::error::Error>> {
    let store = SessionStore::new(Duration::from_millis(50), 1000);
    let id = store.create(session(100, 2)?).await;
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(store.consume(&id).await.is_none());
    Ok(())
}

#[tokio::test]
async fn same_message_id_in_other_chat_is_separate() -> Result<(), Box<dyn std::error::Error>> {
    let store = SessionStore::new(Duration::from_secs(60), 1000);
    let a = store.create(session(1, 7)?).await;
    let b = store.create(session(2, 7)?).await;
    assert_ne!(a, b);
    assert!(store.consume(&a).await.is_some());
    assert!(store.consume(&b).await.is_some());
    Ok(())
}

#[tokio::test]
async fn press_flow_from_token() -> Result<(), Box<dyn std::error::Error>> {
    let store = SessionStore::new(Duration::from_secs(60), 1000);
    let id = store.create(session(-42, 9)?).await;

    let token = Choice::new(id, Selector::Video { height: 480 }).encode();
    let choice = Choice::parse(&token).ok_or("token did not parse")?;
    let consumed = store.consume(&choice.session_id).await.ok_or("session missing")?;
    assert!(consumed.offers(choice.selector));

    // Second press on the same keyboard
    assert!(store.consume(&choice.session_id).await.is_none());
    Ok(())
}
