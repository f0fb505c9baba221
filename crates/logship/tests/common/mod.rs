pub mod mock_server;

use logship::Client;

/// Checks the pipeline conservation invariant: every record offered to
/// `enqueue` is either sent, dropped (with a counted reason), or still
/// queued.
pub fn assert_conserved(client: &Client) {
    let m = client.metrics();
    assert_eq!(
        m.enqueued,
        m.sent
            + m.dropped_overflow
            + m.dropped_validation
            + m.dropped_on_shutdown
            + m.queue_size as u64,
        "conservation violated: {m:?}"
    );
}
