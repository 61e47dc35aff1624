// Unit tests for accept error classification, retry bounds and the accept loop

use crate::config::ServerConfig;
use crate::error::server::AcceptError;
use crate::server::{
    AcceptContext, AcceptOutcome, Acceptor, ConnectionRegistry, MessageLog, ShutdownReport,
    fingerprint, is_listener_closed, retry_backoff, run_accept_loop, serve,
};

use std::collections::VecDeque;
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use backoff::backoff::Backoff;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

const WAIT: Duration = Duration::from_secs(5);

/// One scripted response of [`ScriptedAcceptor`].
#[derive(Debug, Clone, Copy)]
enum Step {
    Fail(ErrorKind),
    Accept,
    /// Accept a real socket but report `SocketAddr` as its peer.
    AcceptAs(SocketAddr),
}

/// Test helper: Replays `script`, then repeats `fallback` forever.
struct ScriptedAcceptor {
    listener: TcpListener,
    script: VecDeque<Step>,
    fallback: Step,
}

impl ScriptedAcceptor {
    fn new(
        listener: TcpListener,
        script: impl IntoIterator<Item = Step>,
        fallback: Step,
    ) -> Self {
        Self {
            listener,
            script: script.into_iter().collect(),
            fallback,
        }
    }
}

impl Acceptor for ScriptedAcceptor {
    async fn accept(&mut self) -> IoResult<(TcpStream, SocketAddr)> {
        match self.script.pop_front().unwrap_or(self.fallback) {
            Step::Fail(kind) => Err(IoError::from(kind)),
            Step::Accept => self.listener.accept().await,
            Step::AcceptAs(peer) => {
                let (stream, _) = self.listener.accept().await?;
                Ok((stream, peer))
            }
        }
    }
}

async fn local_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    (listener, address)
}

fn accept_context(retry_max_elapsed: Duration) -> AcceptContext {
    AcceptContext {
        registry: ConnectionRegistry::new(),
        messages: MessageLog::new(),
        tracker: TaskTracker::new(),
        read_buffer_size: 1024,
        retry_max_elapsed,
    }
}

async fn wait_for_count(registry: &ConnectionRegistry, expected: usize) -> bool {
    timeout(WAIT, async {
        while registry.count().await != expected {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}

/// **VALUE**: Errors that mean "the listener is gone" end the accept loop.
///
/// **BUG THIS CATCHES**: Would catch the loop treating a dead listener as transient
/// and retrying it forever.
#[test]
fn given_listener_gone_errors_when_classified_then_terminal() {
    assert!(is_listener_closed(&IoError::from(ErrorKind::InvalidInput)));
    assert!(is_listener_closed(&IoError::from(ErrorKind::NotConnected)));

    #[cfg(unix)]
    assert!(is_listener_closed(&IoError::from_raw_os_error(9)));
}

/// **VALUE**: Per-connection and resource errors keep the loop alive.
///
/// **BUG THIS CATCHES**: Would catch one client resetting mid-handshake taking the
/// whole server down.
#[test]
fn given_per_connection_errors_when_classified_then_transient() {
    for kind in [
        ErrorKind::ConnectionAborted,
        ErrorKind::ConnectionReset,
        ErrorKind::Interrupted,
        ErrorKind::WouldBlock,
        ErrorKind::OutOfMemory,
    ] {
        assert!(
            !is_listener_closed(&IoError::from(kind)),
            "{kind:?} should be transient"
        );
    }
}

#[test]
fn given_retry_backoff_when_stepped_then_delays_are_bounded() {
    let mut backoff = retry_backoff(Duration::from_secs(30));

    for _ in 0..50 {
        let delay = backoff.next_backoff().expect("within max elapsed time");
        // max_interval plus the default 50% jitter
        assert!(delay <= Duration::from_millis(1500), "delay {delay:?} too long");
    }
}

/// **VALUE**: The retry budget runs out instead of looping forever.
///
/// **BUG THIS CATCHES**: Would catch `max_elapsed_time` being dropped from the
/// backoff, which turns a persistent accept failure into an endless loop.
#[test]
fn given_elapsed_budget_spent_when_stepped_then_gives_up() {
    let mut backoff = retry_backoff(Duration::from_millis(20));

    std::thread::sleep(Duration::from_millis(40));

    assert_eq!(backoff.next_backoff(), None);
}

/// **VALUE**: A burst of transient accept failures does not stop the server.
///
/// **BUG THIS CATCHES**: Would catch a transient error being treated as
/// terminal, or the retry sleep swallowing the next accept.
#[tokio::test]
async fn given_burst_of_aborted_accepts_when_followed_by_success_then_connection_registers() {
    // GIVEN: Five aborted accepts before the real one
    let (listener, address) = local_listener().await;
    let acceptor = ScriptedAcceptor::new(
        listener,
        [Step::Fail(ErrorKind::ConnectionAborted); 5],
        Step::Accept,
    );
    let context = accept_context(Duration::from_secs(5));
    let registry = context.registry.clone();
    let trigger = CancellationToken::new();
    let task = tokio::spawn(run_accept_loop(acceptor, context, trigger.clone()));

    // WHEN: A client connects
    let _client = TcpStream::connect(address).await.unwrap();

    // THEN: It is registered and the loop is still running
    assert!(wait_for_count(&registry, 1).await);
    assert!(!trigger.is_cancelled());

    trigger.cancel();
    let outcome = timeout(WAIT, task).await.unwrap().unwrap();
    assert!(matches!(outcome, Ok(AcceptOutcome::Cancelled)));
}

/// **VALUE**: Each failure streak gets the full retry budget.
///
/// **BUG THIS CATCHES**: Would catch the backoff clock never being reset, so
/// a second short burst long after the first exhausts the budget at once.
#[tokio::test]
async fn given_two_failure_streaks_apart_when_accepting_then_budget_restarts() {
    // GIVEN: A 200ms budget and two failure streaks around a slow success
    let (listener, address) = local_listener().await;
    let abort = Step::Fail(ErrorKind::ConnectionAborted);
    let acceptor = ScriptedAcceptor::new(
        listener,
        [abort, abort, Step::Accept, abort, abort],
        Step::Accept,
    );
    let context = accept_context(Duration::from_millis(200));
    let registry = context.registry.clone();
    let trigger = CancellationToken::new();
    let task = tokio::spawn(run_accept_loop(acceptor, context, trigger.clone()));

    // WHEN: The first client arrives after the budget would have run out
    sleep(Duration::from_millis(400)).await;
    let _first = TcpStream::connect(address).await.unwrap();
    assert!(wait_for_count(&registry, 1).await);
    let _second = TcpStream::connect(address).await.unwrap();

    // THEN: The second streak is retried and the next client registers
    assert!(wait_for_count(&registry, 2).await);
    assert!(!trigger.is_cancelled());

    trigger.cancel();
    timeout(WAIT, task).await.unwrap().unwrap().unwrap();
}

/// **VALUE**: Persistent accept failures end the loop and fire shutdown.
///
/// **BUG THIS CATCHES**: Would catch an endless retry loop, or the loop giving
/// up without cancelling the trigger so the coordinator never runs.
#[tokio::test]
async fn given_endless_accept_failures_when_budget_spent_then_retries_exhausted() {
    // GIVEN: An acceptor that never succeeds and a 100ms budget
    let (listener, _) = local_listener().await;
    let acceptor = ScriptedAcceptor::new(
        listener,
        [] as [Step; 0],
        Step::Fail(ErrorKind::ConnectionAborted),
    );
    let budget = Duration::from_millis(100);
    let trigger = CancellationToken::new();
    let started = Instant::now();

    // WHEN: The loop runs
    let result = timeout(
        WAIT,
        run_accept_loop(acceptor, accept_context(budget), trigger.clone()),
    )
    .await
    .expect("Accept loop must give up within the retry budget");

    // THEN: It reports exhaustion after several attempts and cancels the trigger
    match result {
        Err(AcceptError::RetriesExhausted { attempts, .. }) => assert!(attempts > 1),
        other => panic!("Expected RetriesExhausted, got {other:?}"),
    }
    assert!(trigger.is_cancelled());
    assert!(started.elapsed() < budget + Duration::from_secs(1));
}

#[tokio::test]
async fn given_endless_accept_failures_when_server_waits_then_report_still_sent() {
    // GIVEN: A server whose acceptor admits one client, then only fails
    let (listener, address) = local_listener().await;
    let config = ServerConfig {
        host: String::from("127.0.0.1"),
        port: 0,
        accept_retry_max_elapsed_ms: 100,
        shutdown_grace_ms: 2_000,
        ..Default::default()
    };
    let acceptor = ScriptedAcceptor::new(
        listener,
        [Step::Accept],
        Step::Fail(ErrorKind::ConnectionAborted),
    );
    let handle = serve(acceptor, address, &config);
    let mut client = TcpStream::connect(address).await.unwrap();

    // WHEN: The retry budget runs out
    let report = timeout(WAIT, handle.wait())
        .await
        .expect("Shutdown report must arrive")
        .unwrap();

    // THEN: The coordinator ran and stopped the admitted client
    assert_eq!(
        report,
        ShutdownReport {
            disconnected: 1,
            failed: 0,
            handlers_drained: true,
        }
    );
    let mut received = Vec::new();
    timeout(WAIT, client.read_to_end(&mut received))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, b"STOP");
}

/// **VALUE**: A second socket with a registered id is turned away without
/// disturbing the first.
///
/// **BUG THIS CATCHES**: Would catch the duplicate replacing the live entry, or
/// the rejected socket being left open with no handler reading it.
#[tokio::test]
async fn given_duplicate_fingerprint_when_admitted_then_newcomer_stopped_and_first_kept() {
    // GIVEN: An acceptor that reports the same peer address twice
    let (listener, address) = local_listener().await;
    let peer: SocketAddr = "10.0.0.1:4000".parse().unwrap();
    let acceptor = ScriptedAcceptor::new(
        listener,
        [Step::AcceptAs(peer), Step::AcceptAs(peer)],
        Step::Accept,
    );
    let context = accept_context(Duration::from_secs(5));
    let registry = context.registry.clone();
    let messages = context.messages.clone();
    let trigger = CancellationToken::new();
    let task = tokio::spawn(run_accept_loop(acceptor, context, trigger.clone()));

    let mut first = TcpStream::connect(address).await.unwrap();
    assert!(wait_for_count(&registry, 1).await);

    // WHEN: A second socket arrives under the same id
    let mut second = TcpStream::connect(address).await.unwrap();

    // THEN: The newcomer gets STOP then EOF
    let mut received = Vec::new();
    timeout(WAIT, second.read_to_end(&mut received))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, b"STOP");

    // AND: The first connection is still registered and still read
    assert_eq!(registry.count().await, 1);
    assert!(registry.contains(&fingerprint(&peer.to_string())).await);
    first.write_all(b"still here").await.unwrap();
    let logged = timeout(WAIT, messages.wait_for_len(1)).await.unwrap();
    assert_eq!(logged, vec!["still here"]);

    trigger.cancel();
    timeout(WAIT, task).await.unwrap().unwrap().unwrap();
}
