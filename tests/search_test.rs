use std::time::Duration;

use paged_fetch_engine::engine::search::DebouncedSearchChannel;

#[tokio::test(start_paused = true)]
async fn test_debounce_emits_last_term_after_quiet_interval() {
    let (channel, mut settled) = DebouncedSearchChannel::spawn(Duration::from_millis(500));

    for term in ["j", "jo", "joh", "john"] {
        assert!(channel.push(term));
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(settled.try_recv().is_err());

    tokio::time::sleep(Duration::from_millis(450)).await;
    assert_eq!(settled.try_recv().ok().as_deref(), Some("john"));
    assert!(settled.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_debounce_settles_each_quiet_window() {
    let (channel, mut settled) = DebouncedSearchChannel::spawn(Duration::from_millis(200));

    channel.push("first");
    assert_eq!(settled.recv().await.as_deref(), Some("first"));

    channel.push("sec");
    channel.push("second");
    assert_eq!(settled.recv().await.as_deref(), Some("second"));

    // An empty term is a legitimate settle.
    channel.push("");
    assert_eq!(settled.recv().await.as_deref(), Some(""));
}

#[tokio::test(start_paused = true)]
async fn test_close_drops_pending_input() {
    let (channel, mut settled) = DebouncedSearchChannel::spawn(Duration::from_millis(500));

    channel.push("pending");
    tokio::time::sleep(Duration::from_millis(100)).await;
    channel.close();
    channel.close();

    assert!(channel.is_closed());
    assert!(!channel.push("late"));

    // The task exits and drops its sender without emitting.
    assert_eq!(settled.recv().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_drop_stops_debounce_task() {
    let (channel, mut settled) = DebouncedSearchChannel::spawn(Duration::from_millis(50));
    channel.push("x");
    drop(channel);

    assert_eq!(settled.recv().await, None);
}
