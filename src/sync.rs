//! Persistence gateway: synchronous local writes plus a best-effort remote
//! mirror that never blocks the caller.

use crate::config::RemoteConfig;
use crate::garden::GardenState;
use crate::models::{HistoryEntry, TodoItem};
use crate::persistence::Database;
use crate::remote::{RemoteStore, RestRemoteStore};
use crate::snapshot::{sanitize_garden, sanitize_history, sanitize_todo, Snapshot};
use crate::todos::TodoList;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

/// History rows pulled from the remote tier at startup.
pub const REMOTE_HISTORY_LIMIT: usize = 40;

/// Upper bound on the startup pull; past it the app starts from local state.
const PULL_TIMEOUT: Duration = Duration::from_secs(5);
/// Upper bound on a single remote write, so a stalled upsert frees the guard.
const PUSH_TIMEOUT: Duration = Duration::from_secs(15);

/// A single write to mirror remotely.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOp {
    UpsertGarden(GardenState),
    InsertHistory(HistoryEntry),
    UpsertTodo(TodoItem),
    DeleteTodo(String),
}

/// State read back from the remote tier. Empty fields mean "nothing there".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteState {
    pub garden: Option<GardenState>,
    pub history: Vec<HistoryEntry>,
    pub todos: Vec<TodoItem>,
}

impl RemoteState {
    /// Overwrites local state with whatever the remote tier had.
    pub fn apply_to(self, snapshot: &mut Snapshot) -> bool {
        let mut changed = false;
        if let Some(garden) = self.garden {
            snapshot.garden = garden;
            changed = true;
        }
        if !self.history.is_empty() {
            snapshot.history = self.history;
            changed = true;
        }
        if !self.todos.is_empty() {
            snapshot.todos = TodoList::from_parts(self.todos, None).items;
            changed = true;
        }
        changed
    }
}

/// Fire-and-forget mirror of local writes to a [`RemoteStore`].
pub struct RemoteMirror {
    store: Arc<dyn RemoteStore>,
    user_id: Arc<str>,
    runtime: Runtime,
    garden_in_flight: Arc<AtomicBool>,
    pull_timeout: Duration,
    push_timeout: Duration,
}

impl RemoteMirror {
    pub fn new(store: Arc<dyn RemoteStore>, user_id: impl Into<Arc<str>>) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("remote-sync")
            .enable_all()
            .build()?;

        Ok(Self {
            store,
            user_id: user_id.into(),
            runtime,
            garden_in_flight: Arc::new(AtomicBool::new(false)),
            pull_timeout: PULL_TIMEOUT,
            push_timeout: PUSH_TIMEOUT,
        })
    }

    pub fn with_timeouts(mut self, pull: Duration, push: Duration) -> Self {
        self.pull_timeout = pull;
        self.push_timeout = push;
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Provisions the schema and pulls the remote copy. Failures are logged
    /// and leave the affected resource empty; a pull that outlasts the
    /// timeout yields an empty state.
    pub fn pull(&self) -> RemoteState {
        let store = Arc::clone(&self.store);
        let user_id = Arc::clone(&self.user_id);
        let limit = self.pull_timeout;

        self.runtime.block_on(async move {
            match tokio::time::timeout(limit, fetch_state(store.as_ref(), &user_id)).await {
                Ok(state) => state,
                Err(_) => {
                    warn!("remote pull timed out after {:?}; starting from local state", limit);
                    RemoteState::default()
                }
            }
        })
    }

    /// Spawns the remote write for `op`. Returns `None` if a garden upsert is
    /// already in flight; the dropped write is picked up by the next one.
    /// The handle resolves to whether the remote write applied.
    pub fn push(&self, op: RemoteOp) -> Option<JoinHandle<bool>> {
        let guard = match op {
            RemoteOp::UpsertGarden(_) => {
                if self
                    .garden_in_flight
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    debug!("garden upsert already in flight; dropping this one");
                    return None;
                }
                Some(Arc::clone(&self.garden_in_flight))
            }
            _ => None,
        };

        let store = Arc::clone(&self.store);
        let user_id = Arc::clone(&self.user_id);
        let limit = self.push_timeout;

        Some(self.runtime.spawn(async move {
            let applied = match tokio::time::timeout(limit, apply(store.as_ref(), &user_id, op)).await {
                Ok(applied) => applied,
                Err(_) => {
                    warn!("remote write timed out after {:?}, local copy kept", limit);
                    false
                }
            };
            if let Some(flag) = guard {
                flag.store(false, Ordering::Release);
            }
            applied
        }))
    }
}

async fn fetch_state(store: &dyn RemoteStore, user_id: &str) -> RemoteState {
    if let Err(e) = store.provision_schema().await {
        warn!("remote schema provisioning skipped: {}", e);
    }

    let garden = match store.fetch_garden(user_id).await {
        Ok(row) => row.as_ref().and_then(sanitize_garden),
        Err(e) => {
            warn!("failed to fetch remote garden: {}", e);
            None
        }
    };

    let history = match store.fetch_history(user_id, REMOTE_HISTORY_LIMIT).await {
        Ok(rows) => sanitize_history(&rows),
        Err(e) => {
            warn!("failed to fetch remote history: {}", e);
            Vec::new()
        }
    };

    let todos = match store.fetch_todos(user_id).await {
        Ok(rows) => rows.iter().filter_map(sanitize_todo).collect(),
        Err(e) => {
            warn!("failed to fetch remote todos: {}", e);
            Vec::new()
        }
    };

    RemoteState {
        garden,
        history,
        todos,
    }
}

async fn apply(store: &dyn RemoteStore, user_id: &str, op: RemoteOp) -> bool {
    let result = match &op {
        RemoteOp::UpsertGarden(garden) => store.upsert_garden(user_id, garden).await,
        RemoteOp::InsertHistory(entry) => store.insert_history(user_id, entry).await,
        RemoteOp::UpsertTodo(todo) => store.upsert_todo(user_id, todo).await,
        RemoteOp::DeleteTodo(id) => store.delete_todo(user_id, id).await,
    };

    match result {
        Ok(()) => true,
        Err(e) => {
            warn!("remote write failed, local copy kept: {}", e);
            false
        }
    }
}

/// Local store plus optional remote mirror.
pub struct PersistenceGateway {
    db: Database,
    remote: Option<RemoteMirror>,
}

impl PersistenceGateway {
    pub fn new(db: Database, remote: Option<RemoteMirror>) -> Self {
        Self { db, remote }
    }

    /// Builds the gateway, enabling the remote tier only when configured.
    pub fn connect(db: Database, config: Option<RemoteConfig>) -> Self {
        let Some(config) = config else {
            info!("remote sync not configured; running local-only");
            return Self::new(db, None);
        };

        let user_id = match config.user_id.clone() {
            Some(id) => id,
            None => match db.load_or_create_user_id() {
                Ok(id) => id,
                Err(e) => {
                    warn!("could not load remote user id, running local-only: {}", e);
                    return Self::new(db, None);
                }
            },
        };

        let store: Arc<dyn RemoteStore> = match RestRemoteStore::new(config) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                warn!("failed to build remote client, running local-only: {}", e);
                return Self::new(db, None);
            }
        };
        match RemoteMirror::new(store, user_id) {
            Ok(mirror) => {
                info!("remote sync enabled for user {}", mirror.user_id());
                Self::new(db, Some(mirror))
            }
            Err(e) => {
                warn!("failed to start remote sync runtime, running local-only: {}", e);
                Self::new(db, None)
            }
        }
    }

    pub fn is_remote_enabled(&self) -> bool {
        self.remote.is_some()
    }

    /// Reads the startup snapshot. Remote state, when present, wins over
    /// local and is written back locally. Local todos the remote tier has
    /// no copy of are pushed up.
    pub fn load(&self) -> Snapshot {
        let mut snapshot = self.db.load_snapshot().unwrap_or_else(|e| {
            warn!("failed to read local snapshot, using defaults: {}", e);
            Snapshot::default()
        });

        if let Some(remote) = &self.remote {
            let pulled = remote.pull();
            let remote_has_todos = !pulled.todos.is_empty();

            if pulled.apply_to(&mut snapshot) {
                info!("restored garden state from remote");
                if let Err(e) = self.db.save_snapshot(&snapshot) {
                    warn!("failed to store pulled snapshot locally: {}", e);
                }
            }

            if !remote_has_todos && !snapshot.todos.is_empty() {
                debug!("uploading {} local todos", snapshot.todos.len());
                for todo in &snapshot.todos {
                    let _ = remote.push(RemoteOp::UpsertTodo(todo.clone()));
                }
            }
        }
        snapshot
    }

    /// Writes the snapshot locally, then queues `ops` for the remote tier.
    /// Returns whether the local write succeeded.
    pub fn persist(&self, snapshot: &Snapshot, ops: Vec<RemoteOp>) -> bool {
        let saved = match self.db.save_snapshot(snapshot) {
            Ok(()) => true,
            Err(e) => {
                warn!("failed to save snapshot: {}", e);
                false
            }
        };

        if let Some(remote) = &self.remote {
            for op in ops {
                // Detached: the task finishes or fails on its own
                let _ = remote.push(op);
            }
        }
        saved
    }

    #[cfg(test)]
    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::TimerMode;
    use crate::remote::RemoteError;
    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};
    use serde_json::{json, Value};
    use std::net::TcpListener;
    use std::sync::Mutex;
    use std::time::Instant;
    use tokio::sync::Notify;

    /// Remote store that records every call and serves canned rows.
    #[derive(Default)]
    pub(crate) struct RecordingStore {
        pub calls: Mutex<Vec<String>>,
        pub garden_row: Option<Value>,
        pub history_rows: Vec<Value>,
        pub todo_rows: Vec<Value>,
        pub fail_writes: bool,
        pub hold_garden: Option<Arc<Notify>>,
    }

    impl RecordingStore {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn write_result(&self) -> Result<(), RemoteError> {
            if self.fail_writes {
                Err(RemoteError::Status {
                    action: "testing",
                    status: 503,
                    body: String::new(),
                })
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl RemoteStore for RecordingStore {
        async fn provision_schema(&self) -> Result<(), RemoteError> {
            self.record("provision".to_string());
            Err(RemoteError::NoProjectRef)
        }

        async fn fetch_garden(&self, user_id: &str) -> Result<Option<Value>, RemoteError> {
            self.record(format!("fetch_garden:{user_id}"));
            Ok(self.garden_row.clone())
        }

        async fn fetch_history(&self, user_id: &str, limit: usize) -> Result<Vec<Value>, RemoteError> {
            self.record(format!("fetch_history:{user_id}:{limit}"));
            Ok(self.history_rows.clone())
        }

        async fn fetch_todos(&self, user_id: &str) -> Result<Vec<Value>, RemoteError> {
            self.record(format!("fetch_todos:{user_id}"));
            Ok(self.todo_rows.clone())
        }

        async fn upsert_garden(&self, user_id: &str, garden: &GardenState) -> Result<(), RemoteError> {
            if let Some(gate) = &self.hold_garden {
                gate.notified().await;
            }
            self.record(format!("upsert_garden:{user_id}:{}", garden.total_sessions));
            self.write_result()
        }

        async fn insert_history(&self, user_id: &str, entry: &HistoryEntry) -> Result<(), RemoteError> {
            self.record(format!("insert_history:{user_id}:{}", entry.session_type));
            self.write_result()
        }

        async fn upsert_todo(&self, user_id: &str, todo: &TodoItem) -> Result<(), RemoteError> {
            self.record(format!("upsert_todo:{user_id}:{}", todo.todo_text));
            self.write_result()
        }

        async fn delete_todo(&self, user_id: &str, todo_id: &str) -> Result<(), RemoteError> {
            self.record(format!("delete_todo:{user_id}:{todo_id}"));
            self.write_result()
        }
    }

    fn mirror(store: &Arc<RecordingStore>) -> RemoteMirror {
        let store: Arc<dyn RemoteStore> = Arc::clone(store) as Arc<dyn RemoteStore>;
        RemoteMirror::new(store, "user-1").unwrap()
    }

    fn wait(mirror: &RemoteMirror, handle: JoinHandle<bool>) -> bool {
        mirror.runtime.block_on(handle).unwrap()
    }

    #[test]
    fn test_local_only_gateway_persists_without_remote() {
        let gateway = PersistenceGateway::connect(Database::new_in_memory().unwrap(), None);
        assert!(!gateway.is_remote_enabled());

        let snapshot = Snapshot {
            focus_minutes: 35,
            ..Snapshot::default()
        };
        let ops = vec![RemoteOp::UpsertGarden(GardenState::default())];
        assert!(gateway.persist(&snapshot, ops));
        assert_eq!(gateway.load().focus_minutes, 35);
    }

    #[test]
    fn test_config_from_parts_without_token_is_local_only() {
        let config = RemoteConfig::from_parts(Some("https://abc.supabase.co"), None);
        let gateway = PersistenceGateway::connect(Database::new_in_memory().unwrap(), config);
        assert!(!gateway.is_remote_enabled());
    }

    #[test]
    fn test_pull_sanitizes_remote_rows() {
        let store = Arc::new(RecordingStore {
            garden_row: Some(json!({
                "user_id": "user-1",
                "total_sessions": 11,
                "sessions_today": 2,
                "streak_days": 4,
                "last_session_date": "2024-04-02"
            })),
            history_rows: vec![
                json!({ "id": "h1", "session_type": "focus", "duration_minutes": 25, "completed_at": "2024-04-02T10:00:00Z" }),
                json!({ "id": "h2", "session_type": "bogus", "duration_minutes": 25, "completed_at": "2024-04-02T10:00:00Z" }),
            ],
            ..RecordingStore::default()
        });
        let mirror = mirror(&store);
        let state = mirror.pull();

        assert_eq!(state.garden.as_ref().unwrap().total_sessions, 11);
        assert_eq!(
            state.garden.as_ref().unwrap().last_session_date,
            NaiveDate::from_ymd_opt(2024, 4, 2)
        );
        assert_eq!(state.history.len(), 1);
        assert!(state.todos.is_empty());
        assert_eq!(
            store.calls(),
            vec![
                "provision".to_string(),
                "fetch_garden:user-1".to_string(),
                format!("fetch_history:user-1:{REMOTE_HISTORY_LIMIT}"),
                "fetch_todos:user-1".to_string(),
            ]
        );
    }

    #[test]
    fn test_remote_wins_on_load() {
        let db = Database::new_in_memory().unwrap();
        db.save_snapshot(&Snapshot {
            focus_minutes: 40,
            garden: GardenState {
                total_sessions: 2,
                ..GardenState::default()
            },
            ..Snapshot::default()
        })
        .unwrap();

        let store = Arc::new(RecordingStore {
            garden_row: Some(json!({ "total_sessions": 20, "streak_days": 3 })),
            ..RecordingStore::default()
        });
        let gateway = PersistenceGateway::new(db, Some(mirror(&store)));
        let snapshot = gateway.load();

        assert_eq!(snapshot.garden.total_sessions, 20);
        assert_eq!(snapshot.focus_minutes, 40);
        // Pulled state is written back locally
        assert_eq!(
            gateway.database().load_snapshot().unwrap().garden.total_sessions,
            20
        );
    }

    #[test]
    fn test_malformed_remote_garden_does_not_override_local() {
        let db = Database::new_in_memory().unwrap();
        db.save_snapshot(&Snapshot {
            garden: GardenState {
                total_sessions: 7,
                ..GardenState::default()
            },
            ..Snapshot::default()
        })
        .unwrap();

        let store = Arc::new(RecordingStore {
            garden_row: Some(json!({ "user_id": "user-1", "total_sessions": "seven" })),
            ..RecordingStore::default()
        });
        let gateway = PersistenceGateway::new(db, Some(mirror(&store)));
        assert_eq!(gateway.load().garden.total_sessions, 7);
    }

    #[test]
    fn test_load_gives_up_on_unresponsive_remote() {
        // Accepts connections but never answers
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}");
        let config = RemoteConfig::from_parts(Some(url.as_str()), Some("token")).unwrap();
        let store: Arc<dyn RemoteStore> = Arc::new(RestRemoteStore::new(config).unwrap());
        let mirror = RemoteMirror::new(store, "user-1")
            .unwrap()
            .with_timeouts(Duration::from_millis(300), Duration::from_millis(300));

        let db = Database::new_in_memory().unwrap();
        let local = Snapshot {
            focus_minutes: 45,
            ..Snapshot::default()
        };
        db.save_snapshot(&local).unwrap();
        let gateway = PersistenceGateway::new(db, Some(mirror));

        let started = Instant::now();
        let snapshot = gateway.load();
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(snapshot, local);

        // A stalled garden upsert times out and frees the guard
        let remote = gateway.remote.as_ref().unwrap();
        let handle = remote
            .push(RemoteOp::UpsertGarden(GardenState::default()))
            .unwrap();
        assert!(!wait(remote, handle));
        assert!(remote
            .push(RemoteOp::UpsertGarden(GardenState::default()))
            .is_some());
        drop(listener);
    }

    #[test]
    fn test_stalled_garden_upsert_releases_guard() {
        // The gate is never opened
        let store = Arc::new(RecordingStore {
            hold_garden: Some(Arc::new(Notify::new())),
            ..RecordingStore::default()
        });
        let mirror = mirror(&store).with_timeouts(Duration::from_millis(50), Duration::from_millis(50));

        let handle = mirror
            .push(RemoteOp::UpsertGarden(GardenState::default()))
            .unwrap();
        assert!(!wait(&mirror, handle));
        assert!(mirror
            .push(RemoteOp::UpsertGarden(GardenState::default()))
            .is_some());
    }

    #[test]
    fn test_local_todos_are_uploaded_when_remote_has_none() {
        let db = Database::new_in_memory().unwrap();
        let todo = TodoItem {
            id: "t1".to_string(),
            todo_text: "plan the week".to_string(),
            completed: false,
            created_at: Utc::now(),
        };
        db.save_snapshot(&Snapshot {
            todos: vec![todo],
            ..Snapshot::default()
        })
        .unwrap();

        let store = Arc::new(RecordingStore::default());
        let gateway = PersistenceGateway::new(db, Some(mirror(&store)));
        assert_eq!(gateway.load().todos.len(), 1);

        let expected = "upsert_todo:user-1:plan the week".to_string();
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline && !store.calls().contains(&expected) {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(store.calls().contains(&expected));
    }

    #[test]
    fn test_remote_todos_are_not_echoed_back() {
        let store = Arc::new(RecordingStore {
            todo_rows: vec![json!({
                "id": "t9",
                "todo_text": "from another device",
                "completed": false,
                "created_at": "2024-03-10T12:00:00Z"
            })],
            ..RecordingStore::default()
        });
        let gateway = PersistenceGateway::new(Database::new_in_memory().unwrap(), Some(mirror(&store)));
        assert_eq!(gateway.load().todos[0].id, "t9");

        std::thread::sleep(Duration::from_millis(50));
        assert!(!store.calls().iter().any(|call| call.starts_with("upsert_todo")));
    }

    #[test]
    fn test_empty_remote_keeps_local() {
        let db = Database::new_in_memory().unwrap();
        let local = Snapshot {
            history: vec![HistoryEntry::new(TimerMode::Focus, 25, Utc::now())],
            ..Snapshot::default()
        };
        db.save_snapshot(&local).unwrap();

        let store = Arc::new(RecordingStore::default());
        let gateway = PersistenceGateway::new(db, Some(mirror(&store)));
        assert_eq!(gateway.load(), local);
    }

    #[test]
    fn test_push_applies_each_op() {
        let store = Arc::new(RecordingStore::default());
        let mirror = mirror(&store);
        let todo = TodoItem {
            id: "t1".to_string(),
            todo_text: "stretch".to_string(),
            completed: false,
            created_at: Utc::now(),
        };

        let ops = vec![
            RemoteOp::InsertHistory(HistoryEntry::new(TimerMode::Break, 5, Utc::now())),
            RemoteOp::UpsertTodo(todo),
            RemoteOp::DeleteTodo("t1".to_string()),
            RemoteOp::UpsertGarden(GardenState::default()),
        ];
        for op in ops {
            let handle = mirror.push(op).unwrap();
            assert!(wait(&mirror, handle));
        }

        let calls = store.calls();
        assert!(calls.contains(&"insert_history:user-1:break".to_string()));
        assert!(calls.contains(&"upsert_todo:user-1:stretch".to_string()));
        assert!(calls.contains(&"delete_todo:user-1:t1".to_string()));
        assert!(calls.contains(&"upsert_garden:user-1:0".to_string()));
    }

    #[test]
    fn test_failed_push_reports_false() {
        let store = Arc::new(RecordingStore {
            fail_writes: true,
            ..RecordingStore::default()
        });
        let mirror = mirror(&store);

        let handle = mirror
            .push(RemoteOp::UpsertGarden(GardenState::default()))
            .unwrap();
        assert!(!wait(&mirror, handle));

        // The guard is released even when the write fails
        assert!(mirror
            .push(RemoteOp::UpsertGarden(GardenState::default()))
            .is_some());
    }

    #[test]
    fn test_overlapping_garden_upsert_is_dropped() {
        let gate = Arc::new(Notify::new());
        let store = Arc::new(RecordingStore {
            hold_garden: Some(Arc::clone(&gate)),
            ..RecordingStore::default()
        });
        let mirror = mirror(&store);

        let first = GardenState {
            total_sessions: 1,
            ..GardenState::default()
        };
        let second = GardenState {
            total_sessions: 2,
            ..GardenState::default()
        };

        let handle = mirror.push(RemoteOp::UpsertGarden(first)).unwrap();
        assert!(mirror.push(RemoteOp::UpsertGarden(second)).is_none());

        // Other resources are not held back by the garden guard
        let history = mirror
            .push(RemoteOp::InsertHistory(HistoryEntry::new(TimerMode::Focus, 25, Utc::now())))
            .unwrap();
        assert!(wait(&mirror, history));

        gate.notify_one();
        assert!(wait(&mirror, handle));

        let third = GardenState {
            total_sessions: 3,
            ..GardenState::default()
        };
        gate.notify_one();
        let handle = mirror.push(RemoteOp::UpsertGarden(third)).unwrap();
        assert!(wait(&mirror, handle));

        let garden_calls: Vec<String> = store
            .calls()
            .into_iter()
            .filter(|call| call.starts_with("upsert_garden"))
            .collect();
        assert_eq!(
            garden_calls,
            vec!["upsert_garden:user-1:1".to_string(), "upsert_garden:user-1:3".to_string()]
        );
    }
}
