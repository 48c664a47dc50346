//! Integration tests for the SMTP mailer.
//!
//! A scripted in-process server answers each command over an in-memory
//! duplex stream, so whole deliveries run without a network.

#![allow(clippy::unwrap_used, clippy::expect_used, missing_docs)]

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::time::Instant;

use relaymail_smtp::{
    Connector, DeliveryHandler, Error, ErrorKind, Mailer, MailerConfig, Message, Part, Result,
};

/// Reply that makes the server drop the connection instead of answering.
const HANG_UP: &str = "";

/// Placed after a reply, makes the server stop reading once that reply is
/// sent while keeping the connection open.
const STOP_READING: &str = "<stop reading>";

/// What the next connection attempt does.
enum Attempt {
    /// Fails immediately.
    Refuse,
    /// Never completes.
    Hang,
    /// The host does not resolve.
    NoSuchHost,
    /// Opens a stream to a server sending these replies: the greeting
    /// first, then one per received command.
    Serve(Vec<&'static str>),
}

#[derive(Default)]
struct ScriptedConnector {
    attempts: Mutex<VecDeque<Attempt>>,
    ports: Mutex<Vec<u16>>,
    upgrades: Mutex<Vec<bool>>,
    fail_upgrade: bool,
    transcript: Arc<Mutex<Vec<String>>>,
}

impl ScriptedConnector {
    fn new(attempts: Vec<Attempt>) -> Self {
        Self {
            attempts: Mutex::new(attempts.into()),
            ..Self::default()
        }
    }

    fn serving(replies: Vec<&'static str>) -> Self {
        Self::new(vec![Attempt::Serve(replies)])
    }

    fn transcript(&self) -> Vec<String> {
        self.transcript.lock().unwrap().clone()
    }

    fn ports(&self) -> Vec<u16> {
        self.ports.lock().unwrap().clone()
    }
}

impl Connector for ScriptedConnector {
    type Stream = DuplexStream;

    async fn connect(&self, host: &str, port: u16) -> Result<DuplexStream> {
        self.ports.lock().unwrap().push(port);
        let attempt = { self.attempts.lock().unwrap().pop_front() };

        match attempt {
            Some(Attempt::Serve(replies)) => {
                let (client, server) = tokio::io::duplex(64 * 1024);
                tokio::spawn(serve(server, replies, Arc::clone(&self.transcript)));
                Ok(client)
            }
            Some(Attempt::Hang) => std::future::pending().await,
            Some(Attempt::NoSuchHost) => Err(Error::NonExistentDomain(host.to_string())),
            Some(Attempt::Refuse) | None => Err(Error::ConnectionFailed(
                io::ErrorKind::ConnectionRefused.into(),
            )),
        }
    }

    async fn upgrade(
        &self,
        stream: DuplexStream,
        _host: &str,
        validate_certificate_chain: bool,
    ) -> Result<DuplexStream> {
        self.upgrades.lock().unwrap().push(validate_certificate_chain);
        if self.fail_upgrade {
            Err(Error::TlsFailed("certificate not trusted".into()))
        } else {
            Ok(stream)
        }
    }
}

async fn serve(stream: DuplexStream, replies: Vec<&'static str>, transcript: Arc<Mutex<Vec<String>>>) {
    let (read, mut write) = tokio::io::split(stream);
    let mut reader = BufReader::new(read);
    let mut replies = replies.into_iter().peekable();
    let mut in_data = false;

    if let Some(greeting) = replies.next()
        && write.write_all(greeting.as_bytes()).await.is_err()
    {
        return;
    }

    loop {
        let Some(received) = read_command(&mut reader, in_data).await else {
            return;
        };
        transcript.lock().unwrap().push(received);

        match replies.next() {
            Some(HANG_UP) => return,
            Some(reply) => {
                in_data = reply.starts_with("354");
                if write.write_all(reply.as_bytes()).await.is_err() {
                    return;
                }
                if replies.next_if_eq(&STOP_READING).is_some() {
                    std::future::pending::<()>().await;
                }
            }
            // Script exhausted: keep listening without answering.
            None => in_data = false,
        }
    }
}

/// Reads one command line, or a whole DATA payload up to the lone dot.
async fn read_command<R: tokio::io::AsyncBufRead + Unpin>(reader: &mut R, in_data: bool) -> Option<String> {
    let mut received = String::new();
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => return None,
            Ok(_) => {}
        }
        received.push_str(&line);
        if !in_data || line == ".\r\n" {
            return Some(received);
        }
    }
}

#[derive(Default)]
struct Recorder {
    sent: usize,
    failed: Vec<(ErrorKind, Option<u16>)>,
}

impl DeliveryHandler for Recorder {
    fn on_sent(&mut self, _message: &Message) {
        self.sent += 1;
    }

    fn on_failed(&mut self, _message: &Message, error: &Error) {
        self.failed.push((error.kind(), error.code()));
    }
}

impl Recorder {
    fn assert_sent(&self) {
        assert_eq!(self.sent, 1, "failures: {:?}", self.failed);
        assert!(self.failed.is_empty());
    }

    fn assert_failed(&self, kind: ErrorKind) -> Option<u16> {
        assert_eq!(self.sent, 0);
        assert_eq!(self.failed.len(), 1);
        assert_eq!(self.failed[0].0, kind);
        self.failed[0].1
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn message() -> Message {
    Message::new("smtp.example.com", "a@x.com", "b@y.com").part(Part::text("hi"))
}

fn mailer(connector: ScriptedConnector) -> Mailer<ScriptedConnector> {
    init_tracing();
    Mailer::with_connector(connector, MailerConfig::default())
}

async fn send(mailer: &Mailer<ScriptedConnector>, message: &Message) -> Recorder {
    let mut recorder = Recorder::default();
    mailer.send(message, &mut recorder).await;
    recorder
}

const PLAIN_DIALOGUE: [&str; 7] = [
    "220 mail.example.com ESMTP\r\n",
    "250 mail.example.com\r\n",
    "250 OK\r\n",
    "250 OK\r\n",
    "354 Start mail input\r\n",
    "250 Queued\r\n",
    "221 Bye\r\n",
];

#[tokio::test]
async fn plain_delivery() {
    let mailer = mailer(ScriptedConnector::serving(PLAIN_DIALOGUE.to_vec()));
    send(&mailer, &message()).await.assert_sent();

    let transcript = mailer.connector().transcript();
    assert_eq!(transcript.len(), 6);
    assert_eq!(transcript[0], "EHLO localhost\r\n");
    assert_eq!(transcript[1], "MAIL FROM:<a@x.com>\r\n");
    assert_eq!(transcript[2], "RCPT TO:<b@y.com>\r\n");
    assert_eq!(transcript[3], "DATA\r\n");
    assert!(transcript[4].starts_with("From: a@x.com\r\nTo: b@y.com\r\n"));
    assert!(transcript[4].contains("\r\n\r\nhi\r\n"));
    assert!(transcript[4].ends_with("\r\n.\r\n"));
    assert_eq!(transcript[5], "QUIT\r\n");
    assert_eq!(mailer.connector().ports(), vec![25]);
}

#[tokio::test]
async fn recipient_rejected_before_data() {
    let mailer = mailer(ScriptedConnector::serving(vec![
        "220 hi\r\n",
        "250 mail\r\n",
        "250 OK\r\n",
        "550 5.1.1 No such user\r\n",
    ]));
    let code = send(&mailer, &message())
        .await
        .assert_failed(ErrorKind::MessageRejected);
    assert_eq!(code, Some(550));
    assert!(!mailer.connector().transcript().contains(&"DATA\r\n".to_string()));
}

#[tokio::test]
async fn relay_denied() {
    let mailer = mailer(ScriptedConnector::serving(vec![
        "220 hi\r\n",
        "250 mail\r\n",
        "530 5.7.0 Authentication required\r\n",
    ]));
    let code = send(&mailer, &message())
        .await
        .assert_failed(ErrorKind::RelayRejected);
    assert_eq!(code, Some(530));
}

#[tokio::test]
async fn starttls_then_auth() {
    let mailer = mailer(ScriptedConnector::serving(vec![
        "220 hi\r\n",
        "250-mail\r\n250-STARTTLS\r\n250 AUTH LOGIN\r\n",
        "220 Ready to start TLS\r\n",
        "250-mail\r\n250-AUTH PLAIN LOGIN\r\n250 SIZE 1000000\r\n",
        "235 Authenticated\r\n",
        "250 OK\r\n",
        "250 OK\r\n",
        "354 go\r\n",
        "250 Queued\r\n",
        "221 Bye\r\n",
    ]));
    let msg = message().secure(true).credentials("user", "pass");
    send(&mailer, &msg).await.assert_sent();

    let transcript = mailer.connector().transcript();
    assert_eq!(transcript[0], "EHLO localhost\r\n");
    assert_eq!(transcript[1], "STARTTLS\r\n");
    assert_eq!(transcript[2], "EHLO localhost\r\n");
    assert_eq!(transcript[3], "AUTH PLAIN AHVzZXIAcGFzcw==\r\n");
    assert!(transcript[4].starts_with("MAIL FROM:<a@x.com> SIZE="));
    assert_eq!(*mailer.connector().upgrades.lock().unwrap(), vec![true]);
}

#[tokio::test]
async fn starttls_missing() {
    let mailer = mailer(ScriptedConnector::serving(vec!["220 hi\r\n", "250 mail\r\n"]));
    send(&mailer, &message().secure(true))
        .await
        .assert_failed(ErrorKind::TlsUnavailable);
    assert_eq!(mailer.connector().transcript(), vec!["EHLO localhost\r\n"]);
}

#[tokio::test]
async fn tls_handshake_failure() {
    let connector = ScriptedConnector {
        fail_upgrade: true,
        ..ScriptedConnector::serving(vec![
            "220 hi\r\n",
            "250-mail\r\n250 STARTTLS\r\n",
            "220 go\r\n",
        ])
    };
    let mailer = mailer(connector);
    let msg = message().secure(true).validate_certificate_chain(false);
    send(&mailer, &msg).await.assert_failed(ErrorKind::TlsFailed);
    assert_eq!(*mailer.connector().upgrades.lock().unwrap(), vec![false]);
}

#[tokio::test]
async fn login_auth() {
    let mailer = mailer(ScriptedConnector::serving(vec![
        "220 hi\r\n",
        "250-mail\r\n250 AUTH=LOGIN\r\n",
        "334 VXNlcm5hbWU6\r\n",
        "334 UGFzc3dvcmQ6\r\n",
        "235 ok\r\n",
        "250 OK\r\n",
        "250 OK\r\n",
        "354 go\r\n",
        "250 Queued\r\n",
        "221 Bye\r\n",
    ]));
    send(&mailer, &message().credentials("user", "pass"))
        .await
        .assert_sent();

    let transcript = mailer.connector().transcript();
    assert_eq!(&transcript[1..4], ["AUTH LOGIN\r\n", "dXNlcg==\r\n", "cGFzcw==\r\n"]);
}

#[tokio::test]
async fn cram_md5_auth() {
    let mailer = mailer(ScriptedConnector::serving(vec![
        "220 hi\r\n",
        "250-mail\r\n250 AUTH PLAIN LOGIN CRAM-MD5\r\n",
        "334 PDE4OTYuNjk3MTcwOTUyQHBvc3RvZmZpY2UucmVzdG9uLm1jaS5uZXQ+\r\n",
        "235 ok\r\n",
        "250 OK\r\n",
        "250 OK\r\n",
        "354 go\r\n",
        "250 Queued\r\n",
        "221 Bye\r\n",
    ]));
    send(&mailer, &message().credentials("tim", "tanstaaftanstaaf"))
        .await
        .assert_sent();

    let transcript = mailer.connector().transcript();
    assert_eq!(transcript[1], "AUTH CRAM-MD5\r\n");
    assert_eq!(
        transcript[2],
        "dGltIGI5MTNhNjAyYzdlZGE3YTQ5NWI0ZTZlNzMzNGQzODkw\r\n"
    );
}

#[tokio::test]
async fn invalid_credentials() {
    let mailer = mailer(ScriptedConnector::serving(vec![
        "220 hi\r\n",
        "250-mail\r\n250 AUTH PLAIN\r\n",
        "535 5.7.8 Authentication credentials invalid\r\n",
    ]));
    let code = send(&mailer, &message().credentials("user", "wrong"))
        .await
        .assert_failed(ErrorKind::InvalidCredentials);
    assert_eq!(code, Some(535));
}

#[tokio::test]
async fn unsupported_auth_sends_no_auth() {
    let mailer = mailer(ScriptedConnector::serving(vec![
        "220 hi\r\n",
        "250-mail\r\n250 AUTH XOAUTH2 OAUTHBEARER\r\n",
    ]));
    send(&mailer, &message().credentials("user", "pass"))
        .await
        .assert_failed(ErrorKind::UnsupportedAuthMechanism);
    assert!(
        mailer
            .connector()
            .transcript()
            .iter()
            .all(|line| !line.starts_with("AUTH"))
    );
}

#[tokio::test]
async fn multiple_recipients_and_hidden_bcc() {
    let mut replies = vec!["220 hi\r\n", "250 mail\r\n", "250 OK\r\n"];
    replies.extend(["250 OK\r\n"; 4]);
    replies.extend(["354 go\r\n", "250 Queued\r\n", "221 Bye\r\n"]);
    let mailer = mailer(ScriptedConnector::serving(replies));

    let msg = Message::new("smtp.example.com", "Alice <a@x.com>", "b@y.com, c@y.com")
        .cc("d@z.com")
        .bcc("secret@w.com")
        .part(Part::text("hi"));
    send(&mailer, &msg).await.assert_sent();

    let transcript = mailer.connector().transcript();
    assert_eq!(
        &transcript[2..6],
        [
            "RCPT TO:<b@y.com>\r\n",
            "RCPT TO:<c@y.com>\r\n",
            "RCPT TO:<d@z.com>\r\n",
            "RCPT TO:<secret@w.com>\r\n",
        ]
    );
    assert!(transcript[7].contains("Cc: d@z.com\r\n"));
    assert!(!transcript[7].contains("secret@w.com"));
}

#[tokio::test]
async fn lone_dot_is_stuffed_on_the_wire() {
    let mailer = mailer(ScriptedConnector::serving(PLAIN_DIALOGUE.to_vec()));
    mailer
        .deliver_content(&message(), b"Subject: dots\r\n\r\nbefore\r\n.\r\nafter\r\n")
        .await
        .unwrap();

    let transcript = mailer.connector().transcript();
    assert_eq!(transcript[4], "Subject: dots\r\n\r\nbefore\r\n..\r\nafter\r\n.\r\n");
}

#[tokio::test]
async fn attachment_round_trips() {
    let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
    let msg = message().part(Part::attachment("blob.bin", "application/octet-stream", data.clone()));
    let mailer = mailer(ScriptedConnector::serving(PLAIN_DIALOGUE.to_vec()));
    send(&mailer, &msg).await.assert_sent();

    let payload = &mailer.connector().transcript()[4];
    assert!(payload.contains("Content-Type: multipart/mixed"));
    assert!(payload.contains("Content-Disposition: attachment; filename=\"blob.bin\""));

    let start = payload.find("Content-Transfer-Encoding: base64\r\n").unwrap();
    let body_start = start + payload[start..].find("\r\n\r\n").unwrap() + 4;
    let body_end = body_start + payload[body_start..].find("\r\n--").unwrap();
    let decoded = relaymail_mime::encoding::decode_base64(&payload[body_start..body_end]).unwrap();
    assert_eq!(decoded, data);
}

#[tokio::test]
async fn any_quit_reply_is_success() {
    let mut replies = PLAIN_DIALOGUE.to_vec();
    replies[6] = "500 What?\r\n";
    let mailer = mailer(ScriptedConnector::serving(replies));
    send(&mailer, &message()).await.assert_sent();
}

#[tokio::test]
async fn hang_up_after_quit_is_success() {
    let mut replies = PLAIN_DIALOGUE.to_vec();
    replies[6] = HANG_UP;
    let mailer = mailer(ScriptedConnector::serving(replies));
    send(&mailer, &message()).await.assert_sent();
}

#[tokio::test]
async fn hang_up_mid_dialogue() {
    let mailer = mailer(ScriptedConnector::serving(vec!["220 hi\r\n", "250 mail\r\n", HANG_UP]));
    send(&mailer, &message())
        .await
        .assert_failed(ErrorKind::ConnectionInterrupted);
}

#[tokio::test]
async fn unexpected_greeting() {
    let mailer = mailer(ScriptedConnector::serving(vec!["554 No SMTP service here\r\n"]));
    let code = send(&mailer, &message())
        .await
        .assert_failed(ErrorKind::ProtocolViolation);
    assert_eq!(code, Some(554));
    assert!(mailer.connector().transcript().is_empty());
}

#[tokio::test(start_paused = true)]
async fn connect_timeout_writes_nothing() {
    let mailer = mailer(ScriptedConnector::new(vec![Attempt::Hang]));
    let msg = message().ports([2525]).connect_timeout(Duration::from_secs(8));

    let start = Instant::now();
    send(&mailer, &msg)
        .await
        .assert_failed(ErrorKind::ConnectionTimeout);
    assert_eq!(start.elapsed(), Duration::from_secs(8));
    assert!(mailer.connector().transcript().is_empty());
}

#[tokio::test(start_paused = true)]
async fn watchdog_interrupts_silent_server() {
    let mailer = mailer(ScriptedConnector::serving(vec!["220 hi\r\n"]));

    let start = Instant::now();
    send(&mailer, &message())
        .await
        .assert_failed(ErrorKind::ConnectionInterrupted);
    assert_eq!(start.elapsed(), MailerConfig::default().watchdog_timeout);
    assert_eq!(mailer.connector().transcript(), vec!["EHLO localhost\r\n"]);
}

#[tokio::test(start_paused = true)]
async fn watchdog_interrupts_server_that_stops_reading_payload() {
    init_tracing();
    let config = MailerConfig::default().watchdog_timeout(Duration::from_secs(10));
    let mailer = Mailer::with_connector(
        ScriptedConnector::serving(vec![
            "220 hi\r\n",
            "250 mail\r\n",
            "250 OK\r\n",
            "250 OK\r\n",
            "354 go ahead\r\n",
            STOP_READING,
        ]),
        config,
    );
    let data = vec![0x5a_u8; 200 * 1024];
    let msg = message().part(Part::attachment("big.bin", "application/octet-stream", data));

    let start = Instant::now();
    send(&mailer, &msg)
        .await
        .assert_failed(ErrorKind::ConnectionInterrupted);
    assert_eq!(start.elapsed(), Duration::from_secs(10));
    assert_eq!(mailer.connector().transcript().last().map(String::as_str), Some("DATA\r\n"));
}

#[tokio::test(start_paused = true)]
async fn unbounded_timeouts_do_not_overflow() {
    init_tracing();
    let config = MailerConfig::default().watchdog_timeout(Duration::MAX);
    let mailer = Mailer::with_connector(ScriptedConnector::serving(PLAIN_DIALOGUE.to_vec()), config);
    let msg = message().connect_timeout(Duration::MAX);
    send(&mailer, &msg).await.assert_sent();
}

#[tokio::test(start_paused = true)]
async fn falls_back_across_ports() {
    let mailer = mailer(ScriptedConnector::new(vec![
        Attempt::Refuse,
        Attempt::Hang,
        Attempt::Serve(PLAIN_DIALOGUE.to_vec()),
    ]));
    send(&mailer, &message()).await.assert_sent();
    assert_eq!(mailer.connector().ports(), vec![25, 465, 587]);
}

#[tokio::test]
async fn every_port_refused() {
    let mailer = mailer(ScriptedConnector::new(vec![Attempt::Refuse, Attempt::Refuse]));
    send(&mailer, &message().ports([25, 587]))
        .await
        .assert_failed(ErrorKind::ConnectionFailed);
    assert_eq!(mailer.connector().ports(), vec![25, 587]);
}

#[tokio::test]
async fn unknown_domain_stops_port_fallback() {
    let mailer = mailer(ScriptedConnector::new(vec![Attempt::NoSuchHost]));
    send(&mailer, &message())
        .await
        .assert_failed(ErrorKind::NonExistentDomain);
    assert_eq!(mailer.connector().ports(), vec![25]);
}

#[tokio::test]
async fn invalid_message_never_connects() {
    let mailer = mailer(ScriptedConnector::serving(PLAIN_DIALOGUE.to_vec()));
    let msg = Message::new("smtp.example.com", "a@x.com", "").part(Part::text("hi"));
    send(&mailer, &msg)
        .await
        .assert_failed(ErrorKind::InvalidEnvelope);
    assert!(mailer.connector().ports().is_empty());
}

#[tokio::test]
async fn concurrent_sessions_are_independent() {
    let mailer = mailer(ScriptedConnector::new(vec![
        Attempt::Serve(PLAIN_DIALOGUE.to_vec()),
        Attempt::Serve(PLAIN_DIALOGUE.to_vec()),
    ]));
    let first = message();
    let second = Message::new("smtp.example.com", "c@x.com", "d@y.com").part(Part::text("yo"));

    let (a, b) = tokio::join!(send(&mailer, &first), send(&mailer, &second));
    a.assert_sent();
    b.assert_sent();
}
