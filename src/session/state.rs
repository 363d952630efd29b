use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::ServeError;
use crate::listing::Listing;

/// Lifecycle of watching and serving one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No directory chosen yet, or shut down.
    Idle,
    /// Listing, binding the server and starting the watcher for `root`.
    Starting { root: PathBuf },
    /// Watcher feeding the store, server serving `root`.
    Active { root: PathBuf },
    /// Tearing down `from` before starting `to`.
    SwitchingRoot { from: PathBuf, to: PathBuf },
    /// Terminal for the session; only a fresh selection leaves it.
    Failed { reason: String },
}

impl SessionState {
    pub fn root(&self) -> Option<&Path> {
        match self {
            Self::Starting { root } | Self::Active { root } => Some(root),
            Self::SwitchingRoot { to, .. } => Some(to),
            Self::Idle | Self::Failed { .. } => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Starting { root } => write!(f, "starting {}", root.display()),
            Self::Active { root } => write!(f, "active {}", root.display()),
            Self::SwitchingRoot { from, to } => {
                write!(f, "switching {} -> {}", from.display(), to.display())
            }
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Inputs to the state machine: user commands and outcomes of effects.
#[derive(Debug)]
pub enum SessionEvent {
    /// A directory was selected.
    Select(PathBuf),
    /// Prior watcher and server are fully released.
    TornDown,
    /// The initial listing of `root` (canonicalized) succeeded.
    Listed { root: PathBuf, listing: Listing },
    /// The server is accepting on this address.
    Served(SocketAddr),
    /// The watcher is running and its events are being consumed.
    Watching,
    /// Listing, binding or watcher start failed.
    StartFailed(ServeError),
    /// The watcher's event stream ended.
    WatchEnded(ServeError),
    /// Stop everything.
    Shutdown,
}

/// Side effects requested by a transition, executed in order by the driver.
#[derive(Debug, PartialEq, Eq)]
pub enum Effect {
    /// Stop the watcher and consumer, then stop the server. Yields `TornDown`.
    Teardown,
    /// List the directory. Yields `Listed` or `StartFailed`.
    List(PathBuf),
    /// Reset the store to `listing` and start the server on `root`. Yields `Served` or `StartFailed`.
    ResetAndServe { root: PathBuf, listing: Listing },
    /// Start the watcher on `root`. Yields `Watching` or `StartFailed`.
    Watch(PathBuf),
    /// Publish a user-visible status message.
    Report(String),
}

#[derive(Debug)]
pub struct Transition {
    pub next: SessionState,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn to(next: SessionState, effects: Vec<Effect>) -> Self {
        Self { next, effects }
    }

    fn stay(state: SessionState) -> Self {
        Self::to(state, Vec::new())
    }
}

fn failure_message(err: &ServeError) -> String {
    format!("{}: {err}", err.kind())
}

fn folder_name(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.display().to_string())
}

impl SessionState {
    /// Apply `event` and return the next state plus the effects to run.
    pub fn on(self, event: SessionEvent) -> Transition {
        use SessionEvent as E;
        use SessionState as S;

        match (self, event) {
            (_, E::Shutdown) => Transition::to(
                S::Idle,
                vec![Effect::Teardown, Effect::Report("Stopped".to_string())],
            ),

            (S::Idle | S::Failed { .. } | S::Starting { .. }, E::Select(root)) => Transition::to(
                S::Starting { root: root.clone() },
                vec![Effect::Teardown, Effect::List(root)],
            ),
            (S::Active { root: from }, E::Select(to)) => Transition::to(
                S::SwitchingRoot {
                    from,
                    to: to.clone(),
                },
                vec![
                    Effect::Report(format!("Switching to {}", folder_name(&to))),
                    Effect::Teardown,
                ],
            ),
            (S::SwitchingRoot { from, .. }, E::Select(to)) => {
                Transition::stay(S::SwitchingRoot { from, to })
            }

            (S::SwitchingRoot { to, .. }, E::TornDown) => Transition::to(
                S::Starting { root: to.clone() },
                vec![Effect::List(to)],
            ),

            (S::Starting { .. }, E::Listed { root, listing }) => Transition::to(
                S::Starting { root: root.clone() },
                vec![Effect::ResetAndServe { root, listing }],
            ),
            (S::Starting { root }, E::Served(_)) => Transition::to(
                S::Starting { root: root.clone() },
                vec![Effect::Watch(root)],
            ),
            (S::Starting { root }, E::Watching) => {
                let message = format!("Watching {}", folder_name(&root));
                Transition::to(S::Active { root }, vec![Effect::Report(message)])
            }
            (S::Starting { .. }, E::StartFailed(err)) => {
                let reason = failure_message(&err);
                Transition::to(
                    S::Failed {
                        reason: reason.clone(),
                    },
                    vec![Effect::Teardown, Effect::Report(reason)],
                )
            }

            (S::Active { .. }, E::WatchEnded(err)) => {
                let reason = failure_message(&err);
                Transition::to(
                    S::Failed {
                        reason: reason.clone(),
                    },
                    vec![Effect::Teardown, Effect::Report(reason)],
                )
            }

            (state, event) => {
                tracing::debug!("ignoring {event:?} in state {state}");
                Transition::stay(state)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn p(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    fn access_error() -> ServeError {
        ServeError::access(Path::new("/d"), io::Error::from(io::ErrorKind::NotFound))
    }

    #[test]
    fn test_select_from_idle_lists_after_teardown() {
        let t = SessionState::Idle.on(SessionEvent::Select(p("/d")));
        assert_eq!(t.next, SessionState::Starting { root: p("/d") });
        assert_eq!(t.effects, vec![Effect::Teardown, Effect::List(p("/d"))]);
    }

    #[test]
    fn test_happy_path_reaches_active() {
        let t = SessionState::Starting { root: p("/d") }.on(SessionEvent::Listed {
            root: p("/real/d"),
            listing: Listing::new(),
        });
        assert_eq!(
            t.effects,
            vec![Effect::ResetAndServe {
                root: p("/real/d"),
                listing: Listing::new()
            }]
        );

        let t = t
            .next
            .on(SessionEvent::Served("127.0.0.1:80".parse().unwrap()));
        assert_eq!(t.effects, vec![Effect::Watch(p("/real/d"))]);

        let t = t.next.on(SessionEvent::Watching);
        assert_eq!(t.next, SessionState::Active { root: p("/real/d") });
        assert_eq!(t.effects, vec![Effect::Report("Watching d".to_string())]);
    }

    #[test]
    fn test_torn_down_while_starting_is_ignored() {
        let state = SessionState::Starting { root: p("/d") };
        let t = state.clone().on(SessionEvent::TornDown);
        assert_eq!(t.next, state);
        assert!(t.effects.is_empty());
    }

    #[test]
    fn test_list_failure_is_failed_with_access_error() {
        let t = SessionState::Starting { root: p("/d") }
            .on(SessionEvent::StartFailed(access_error()));
        match &t.next {
            SessionState::Failed { reason } => assert!(reason.starts_with("AccessError")),
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(t.effects[0], Effect::Teardown);
    }

    #[test]
    fn test_bind_failure_is_failed_with_bind_error() {
        let err = ServeError::classify_bind(
            "0.0.0.0:80".parse().unwrap(),
            io::Error::from(io::ErrorKind::AddrInUse),
        );
        let t = SessionState::Starting { root: p("/d") }.on(SessionEvent::StartFailed(err));
        match t.next {
            SessionState::Failed { reason } => assert!(reason.starts_with("BindError")),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn test_switch_tears_down_before_starting_new_root() {
        let t = SessionState::Active { root: p("/d1") }.on(SessionEvent::Select(p("/d2")));
        assert_eq!(
            t.next,
            SessionState::SwitchingRoot {
                from: p("/d1"),
                to: p("/d2")
            }
        );
        assert_eq!(t.effects.last(), Some(&Effect::Teardown));
        assert!(!t.effects.iter().any(|e| matches!(e, Effect::List(_))));

        let t = t.next.on(SessionEvent::TornDown);
        assert_eq!(t.next, SessionState::Starting { root: p("/d2") });
        assert_eq!(t.effects, vec![Effect::List(p("/d2"))]);
    }

    #[test]
    fn test_watch_end_fails_session() {
        let t = SessionState::Active { root: p("/d") }.on(SessionEvent::WatchEnded(
            ServeError::Watch("watched directory /d was removed".to_string()),
        ));
        assert!(t.next.is_failed());
        assert_eq!(t.effects[0], Effect::Teardown);
        assert!(matches!(&t.effects[1], Effect::Report(m) if m.starts_with("WatchError")));
    }

    #[test]
    fn test_failed_recovers_only_by_selection() {
        let failed = SessionState::Failed {
            reason: "x".to_string(),
        };
        let t = failed.clone().on(SessionEvent::Watching);
        assert_eq!(t.next, failed);

        let t = failed.on(SessionEvent::Select(p("/d")));
        assert_eq!(t.next, SessionState::Starting { root: p("/d") });
    }

    #[test]
    fn test_shutdown_from_any_state_goes_idle() {
        for state in [
            SessionState::Idle,
            SessionState::Starting { root: p("/d") },
            SessionState::Active { root: p("/d") },
            SessionState::Failed {
                reason: "x".to_string(),
            },
        ] {
            let t = state.on(SessionEvent::Shutdown);
            assert_eq!(t.next, SessionState::Idle);
            assert_eq!(t.effects[0], Effect::Teardown);
        }
    }

    #[test]
    fn test_select_during_switch_retargets() {
        let t = SessionState::SwitchingRoot {
            from: p("/d1"),
            to: p("/d2"),
        }
        .on(SessionEvent::Select(p("/d3")));
        assert_eq!(
            t.next,
            SessionState::SwitchingRoot {
                from: p("/d1"),
                to: p("/d3")
            }
        );
    }
}
