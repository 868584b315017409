//! Host event feed read as JSON lines.
//!
//! The game host (or a replay file) writes one JSON object per line:
//!
//! ```text
//! {"event":"join","uid":"abc","name":"Kora"}
//! {"event":"observe","uid":"abc","observation":{"health":12.0,"max_health":15.0}}
//! {"event":"death","uid":"abc","name":"Kora"}
//! {"event":"leave","uid":"abc","name":"Kora"}
//! {"event":"reload"}
//! ```
//!
//! A `reload` line re-reads the config file and forwards its capture
//! toggles. Malformed lines and failed reloads are logged and skipped;
//! they never end the feed.

use std::path::PathBuf;

use ledger_core::runner::{self, HostEvent, HostEventSource};
use ledger_types::{PlayerObservation, PlayerUid};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

/// One line of the feed, as written by the host.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum WireEvent {
    Join {
        uid: PlayerUid,
        #[serde(default)]
        name: String,
    },
    Leave {
        uid: PlayerUid,
        #[serde(default)]
        name: String,
    },
    Death {
        uid: PlayerUid,
        #[serde(default)]
        name: String,
    },
    Observe {
        uid: PlayerUid,
        #[serde(default)]
        observation: PlayerObservation,
    },
    Reload,
}

/// [`HostEventSource`] over any buffered async reader, typically stdin.
pub struct LineEventSource<R> {
    reader: R,
    /// Bytes of the line being read; kept across polls so a cancelled
    /// read resumes where it stopped.
    buf: Vec<u8>,
    config_path: PathBuf,
    line_number: u64,
}

impl<R: AsyncBufRead + Unpin + Send> LineEventSource<R> {
    /// Read events from `reader`; `reload` lines re-read `config_path`.
    pub fn new(reader: R, config_path: PathBuf) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            config_path,
            line_number: 0,
        }
    }

    /// Turn one raw line into an event, or `None` to skip it.
    fn decode(&self, line: &str) -> Option<HostEvent> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let wire: WireEvent = match serde_json::from_str(line) {
            Ok(wire) => wire,
            Err(e) => {
                warn!(line = self.line_number, error = %e, "Skipping malformed event line");
                return None;
            }
        };

        let event = match wire {
            WireEvent::Join { uid, name } => HostEvent::Join { uid, name },
            WireEvent::Leave { uid, name } => HostEvent::Leave { uid, name },
            WireEvent::Death { uid, name } => HostEvent::Death { uid, name },
            WireEvent::Observe { uid, observation } => HostEvent::Observe {
                uid,
                observation: Box::new(observation),
            },
            WireEvent::Reload => match runner::load_capture(&self.config_path) {
                Ok(capture) => HostEvent::Reload { capture },
                Err(e) => {
                    warn!(
                        path = %self.config_path.display(),
                        error = %e,
                        "Reload failed, keeping current capture config"
                    );
                    return None;
                }
            },
        };
        Some(event)
    }
}

impl<R: AsyncBufRead + Unpin + Send> HostEventSource for LineEventSource<R> {
    async fn next_event(&mut self) -> Option<HostEvent> {
        loop {
            // `read_until` is cancel safe while `buf` lives on `self`.
            match self.reader.read_until(b'\n', &mut self.buf).await {
                Ok(0) => {
                    debug!(lines = self.line_number, "Event feed closed");
                    return None;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "Event feed read failed, treating as closed");
                    return None;
                }
            }
            self.line_number = self.line_number.saturating_add(1);

            let line = match String::from_utf8(std::mem::take(&mut self.buf)) {
                Ok(line) => line,
                Err(e) => {
                    warn!(line = self.line_number, error = %e, "Skipping event line that is not UTF-8");
                    continue;
                }
            };

            if let Some(event) = self.decode(&line) {
                return Some(event);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use ledger_types::CaptureConfig;
    use tempfile::TempDir;
    use tokio::io::BufReader;

    use super::*;

    fn source(input: &'static str, config_path: PathBuf) -> LineEventSource<BufReader<&'static [u8]>> {
        raw_source(input.as_bytes(), config_path)
    }

    fn raw_source(input: &'static [u8], config_path: PathBuf) -> LineEventSource<BufReader<&'static [u8]>> {
        LineEventSource::new(BufReader::new(input), config_path)
    }

    async fn drain<R: AsyncBufRead + Unpin + Send>(src: &mut LineEventSource<R>) -> Vec<HostEvent> {
        let mut events = Vec::new();
        while let Some(event) = src.next_event().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn decodes_player_events() {
        let input = concat!(
            r#"{"event":"join","uid":"abc","name":"Kora"}"#,
            "\n",
            r#"{"event":"death","uid":"abc","name":"Kora"}"#,
            "\n",
            r#"{"event":"leave","uid":"abc"}"#,
            "\n",
        );
        let mut src = source(input, PathBuf::from("unused.yaml"));
        let events = drain(&mut src).await;

        assert_eq!(
            events,
            vec![
                HostEvent::Join {
                    uid: PlayerUid::from("abc"),
                    name: "Kora".to_owned(),
                },
                HostEvent::Death {
                    uid: PlayerUid::from("abc"),
                    name: "Kora".to_owned(),
                },
                HostEvent::Leave {
                    uid: PlayerUid::from("abc"),
                    name: String::new(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn decodes_observation() {
        let input = r#"{"event":"observe","uid":"abc","observation":{"health":12.0,"ping_ms":40,"climate":{"temperature":-3.0,"rainfall":0.1}}}"#;
        let mut src = source(input, PathBuf::from("unused.yaml"));

        let Some(HostEvent::Observe { uid, observation }) = src.next_event().await else {
            panic!("expected an observe event");
        };
        assert_eq!(uid, PlayerUid::from("abc"));
        assert_eq!(observation.ping_ms, Some(40));
        assert!(observation.position.is_none());
        assert!(observation.climate.is_some());
    }

    #[tokio::test]
    async fn malformed_and_blank_lines_are_skipped() {
        let input = concat!(
            "not json\n",
            "\n",
            r#"{"event":"teleport","uid":"abc"}"#,
            "\n",
            r#"{"event":"join"}"#,
            "\n",
            r#"{"event":"join","uid":"ok","name":"Bo"}"#,
            "\n",
        );
        let mut src = source(input, PathBuf::from("unused.yaml"));
        let events = drain(&mut src).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], HostEvent::Join { uid, .. } if uid.as_str() == "ok"));
    }

    #[tokio::test]
    async fn invalid_utf8_line_does_not_end_feed() {
        let input: &'static [u8] = b"{\"event\":\"join\",\"uid\":\"a\",\"name\":\"Ana\"}\n\
            \xff\xfe garbage\n\
            {\"event\":\"death\",\"uid\":\"a\",\"name\":\"Ana\"}\n\
            {\"event\":\"leave\",\"uid\":\"a\",\"name\":\"Ana\"}\n";
        let mut src = raw_source(input, PathBuf::from("unused.yaml"));
        let events = drain(&mut src).await;

        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], HostEvent::Join { .. }));
        assert!(matches!(events[1], HostEvent::Death { .. }));
        assert!(matches!(events[2], HostEvent::Leave { .. }));
        assert_eq!(src.line_number, 4);
    }

    #[tokio::test]
    async fn last_line_without_newline_is_read() {
        let mut src = source(r#"{"event":"death","uid":"a"}"#, PathBuf::from("unused.yaml"));
        assert!(matches!(src.next_event().await, Some(HostEvent::Death { .. })));
        assert!(src.next_event().await.is_none());
    }

    #[tokio::test]
    async fn reload_reads_capture_from_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger-config.yaml");
        std::fs::write(&path, "capture:\n  location: false\n").unwrap();

        let mut src = source("{\"event\":\"reload\"}\n", path);
        let event = src.next_event().await.unwrap();
        assert_eq!(
            event,
            HostEvent::Reload {
                capture: CaptureConfig {
                    location: false,
                    ..CaptureConfig::default()
                },
            }
        );
    }

    #[tokio::test]
    async fn failed_reload_is_skipped() {
        let dir = TempDir::new().unwrap();
        let input = concat!(
            "{\"event\":\"reload\"}\n",
            r#"{"event":"death","uid":"abc","name":"Kora"}"#,
            "\n",
        );
        let mut src = source(input, dir.path().join("missing.yaml"));
        let events = drain(&mut src).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], HostEvent::Death { .. }));
    }
}
