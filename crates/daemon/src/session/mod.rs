// One client connection: bind to a directory, then serve commands in order.
//
// Lifecycle: Unbound -> Bound -> Closed. Every command resolves its paths
// against the session directory before touching disk. Sandbox violations and
// writes in read-only mode are logged and dropped without a reply; other
// failures are answered with an `error` message.

pub mod context;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fuzzy_common::document::{body_start_line, derive_name, Document};
use fuzzy_common::protocol::{
    ClientCommand, CreateRequest, DocumentView, ErrorCode, SaveRequest, ServerMessage, TextRequest,
};
use tracing::{info, warn};

pub use context::DaemonContext;

use crate::error::{CommandError, SessionError};
use crate::sandbox::{PathSandbox, Strictness};
use crate::search::merge_highlights;
use crate::store::{SaveMode, StoreError};

type CommandResult = Result<Option<ServerMessage>, CommandError>;

#[derive(Debug, Clone)]
pub enum SessionState {
    Unbound,
    Bound { subpath: String, sandbox: PathSandbox },
    Closed,
}

pub struct Session {
    ctx: Arc<DaemonContext>,
    state: SessionState,
}

impl Session {
    pub fn new(ctx: Arc<DaemonContext>) -> Self {
        Self { ctx, state: SessionState::Unbound }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Bind to `subpath` under the root. The root itself is allowed.
    pub fn open(&mut self, subpath: &str) -> Result<(), SessionError> {
        match self.state {
            SessionState::Unbound => {}
            SessionState::Bound { .. } => return Err(SessionError::AlreadyBound),
            SessionState::Closed => return Err(SessionError::Closed),
        }

        let sandbox = self.ctx.sandbox.bind(subpath).map_err(|source| {
            SessionError::AuthorizationDenied { subpath: subpath.to_string(), source }
        })?;
        info!(session = %subpath, "session opened");
        self.state = SessionState::Bound { subpath: subpath.to_string(), sandbox };
        Ok(())
    }

    pub fn close(&mut self) {
        if let SessionState::Bound { subpath, .. } = &self.state {
            info!(session = %subpath, "session closed");
        }
        self.state = SessionState::Closed;
    }

    /// Decode one raw frame and run it.
    pub fn handle_message(&self, raw: &[u8]) -> Option<ServerMessage> {
        if !matches!(self.state, SessionState::Bound { .. }) {
            warn!("message received on a session that is not bound");
            return None;
        }
        match ClientCommand::from_slice(raw) {
            Ok(command) => self.handle(command),
            Err(error) => {
                warn!(%error, "malformed request");
                let message = format!("malformed request: {error}");
                Some(ServerMessage::error(ErrorCode::Malformed, message))
            }
        }
    }

    /// Run one command to completion and produce the reply, if any.
    pub fn handle(&self, command: ClientCommand) -> Option<ServerMessage> {
        let SessionState::Bound { subpath, sandbox } = &self.state else {
            warn!(cmd = command.name(), "command received on a session that is not bound");
            return None;
        };
        let name = command.name();
        let commands = Commands { ctx: &self.ctx, sandbox };
        let result = match command {
            ClientCommand::Query(query) => commands.query(&query),
            ClientCommand::Text(request) => commands.text(request),
            ClientCommand::Save(request) => commands.save(request),
            ClientCommand::Delete(file) => commands.delete(&file),
            ClientCommand::Create(request) => commands.create(request),
            ClientCommand::CreateOrOpen(request) => commands.create_or_open(request),
        };
        settle(subpath, name, result)
    }
}

/// Turn a command result into the reply policy.
fn settle(session: &str, cmd: &str, result: CommandResult) -> Option<ServerMessage> {
    let error = match result {
        Ok(reply) => return reply,
        Err(error) => error,
    };

    match error.code() {
        ErrorCode::SandboxViolation | ErrorCode::PermissionDenied => {
            let detail = std::error::Error::source(&error);
            warn!(session, cmd, error = %error, ?detail, "command rejected");
            None
        }
        ErrorCode::CollaboratorFailure => {
            let detail = std::error::Error::source(&error);
            warn!(session, cmd, ?detail, "search collaborator failed");
            Some(ServerMessage::Results(Vec::new()))
        }
        code => {
            warn!(session, cmd, %code, error = %error, "command failed");
            Some(ServerMessage::error(code, error.to_string()))
        }
    }
}

/// Command handlers for one bound session.
struct Commands<'a> {
    ctx: &'a DaemonContext,
    sandbox: &'a PathSandbox,
}

impl Commands<'_> {
    fn query(&self, query: &str) -> CommandResult {
        info!(query, "query");
        let results = self.ctx.search.search(query, self.sandbox.root())?;
        Ok(Some(ServerMessage::Results(results)))
    }

    fn text(&self, request: TextRequest) -> CommandResult {
        info!(file = %request.file, "loading");
        let path = self.resolve(&request.file)?;
        let loaded = self.ctx.store.read(&path).map_err(|e| CommandError::store(&request.file, e))?;
        let mut document = loaded.document;

        if let Some(query) = request.query.as_deref().filter(|q| !q.trim().is_empty()) {
            let highlights = self.ctx.search.annotate(&path, query).unwrap_or_else(|error| {
                warn!(file = %request.file, %error, "highlighting failed");
                Default::default()
            });
            let first_line = body_start_line(&loaded.raw, &document.body);
            document.body = merge_highlights(&document.body, first_line, &highlights);
        }

        Ok(Some(ServerMessage::Text(DocumentView::new(request.file, document))))
    }

    fn save(&self, request: SaveRequest) -> CommandResult {
        info!(file = %request.file, "saving");
        self.require_edit()?;
        let path = self.resolve(&request.file)?;
        let mode = SaveMode {
            allow_rename: self.ctx.config.editing.rename_on_save,
            create: request.create,
        };
        let outcome = self
            .ctx
            .store
            .save(&path, &request.document(), mode)
            .map_err(|e| CommandError::store(&request.file, e))?;

        if outcome.renamed_from.is_some() {
            let new_file = self.relative(&outcome.path, &request.file);
            info!(from = %request.file, to = %new_file, "document renamed");
            return Ok(Some(ServerMessage::Rename(request.file, new_file)));
        }

        let loaded =
            self.ctx.store.read(&outcome.path).map_err(|e| CommandError::store(&request.file, e))?;
        Ok(Some(ServerMessage::Text(DocumentView::new(request.file, loaded.document))))
    }

    fn delete(&self, file: &str) -> CommandResult {
        info!(file, "delete");
        self.require_edit()?;
        let path = self.resolve(file)?;
        if let Err(error) = self.ctx.store.delete(&path) {
            warn!(file, %error, "delete failed");
        }
        Ok(None)
    }

    fn create(&self, request: CreateRequest) -> CommandResult {
        info!(title = %request.title, "create");
        self.require_edit()?;
        let document = empty_document(&request.title);
        let label = request.file.clone().unwrap_or_else(|| request.title.clone());

        let created = match &request.file {
            Some(file) => {
                let path = self.resolve(file)?;
                let (dir, name) = split(&path, file)?;
                self.ctx.store.create_named(dir, name, &document)
            }
            None => self.ctx.store.create(self.sandbox.root(), &document),
        }
        .map_err(|e| CommandError::store(&label, e))?;

        self.open_created(&created, &label)
    }

    fn create_or_open(&self, request: CreateRequest) -> CommandResult {
        info!(title = %request.title, file = ?request.file, "create or open");
        let file = request.file.clone().unwrap_or_else(|| derive_name(&request.title));
        let path = self.resolve(&file)?;

        let exists = match std::fs::symlink_metadata(&path) {
            Ok(_) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(CommandError::store(&file, StoreError::from_io(&path, e))),
        };

        let path = if !exists && self.ctx.editing_enabled() {
            let (dir, name) = split(&path, &file)?;
            self.ctx
                .store
                .create_named(dir, name, &empty_document(&request.title))
                .map_err(|e| CommandError::store(&file, e))?
        } else {
            path
        };

        self.open_created(&path, &file)
    }

    fn open_created(&self, path: &Path, label: &str) -> CommandResult {
        let file = self.relative(path, label);
        let loaded = self.ctx.store.read(path).map_err(|e| CommandError::store(label, e))?;
        Ok(Some(ServerMessage::Text(DocumentView::new(file, loaded.document))))
    }

    fn resolve(&self, file: &str) -> Result<PathBuf, CommandError> {
        self.sandbox.resolve(file, Strictness::Strict).map_err(|e| CommandError::sandbox(file, e))
    }

    fn relative(&self, path: &Path, fallback: &str) -> String {
        self.sandbox.relative(path).unwrap_or_else(|| fallback.to_string())
    }

    fn require_edit(&self) -> Result<(), CommandError> {
        if self.ctx.editing_enabled() {
            Ok(())
        } else {
            Err(CommandError::ReadOnly)
        }
    }
}

fn empty_document(title: &str) -> Document {
    Document { title: title.to_string(), tags: Vec::new(), body: String::new() }
}

fn split<'p>(path: &'p Path, file: &str) -> Result<(&'p Path, &'p str), CommandError> {
    let malformed = || CommandError::Malformed(format!("`{file}` does not name a file"));
    let dir = path.parent().ok_or_else(malformed)?;
    let name = path.file_name().and_then(|n| n.to_str()).ok_or_else(malformed)?;
    Ok((dir, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DaemonConfig;
    use crate::search::{SearchCollaborator, SearchError, SearchScope};
    use fuzzy_common::document::HeaderLayout;
    use serde_json::json;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Answers every search with fixed output and records the scopes.
    struct FakeCollaborator {
        output: Result<String, ()>,
        calls: Mutex<Vec<(String, PathBuf)>>,
    }

    impl SearchCollaborator for FakeCollaborator {
        fn search(
            &self,
            query: &str,
            _limit: usize,
            scope: SearchScope<'_>,
        ) -> Result<String, SearchError> {
            let path = match scope {
                SearchScope::Directory(p) | SearchScope::File(p) => p.to_path_buf(),
            };
            self.calls.lock().unwrap().push((query.to_string(), path));
            self.output
                .clone()
                .map_err(|()| SearchError::Failed { code: Some(2), stderr: "boom".into() })
        }
    }

    struct Fixture {
        _tmp: TempDir,
        root: PathBuf,
        search: Arc<FakeCollaborator>,
        ctx: Arc<DaemonContext>,
    }

    fn fixture_with(editing: bool, output: Result<&str, ()>) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("root");
        fs::create_dir_all(root.join("notes")).unwrap();
        fs::write(root.join("notes").join("a"), "! Shopping List #personal\n\nbuy milk\nbuy eggs")
            .unwrap();

        let mut config = DaemonConfig { root: root.clone(), ..DaemonConfig::default() };
        config.editing.enabled = editing;
        let search = Arc::new(FakeCollaborator {
            output: output.map(str::to_string),
            calls: Mutex::new(Vec::new()),
        });
        let ctx = Arc::new(DaemonContext::new(config, search.clone()).unwrap());
        let root = ctx.sandbox.root().to_path_buf();
        Fixture { _tmp: tmp, root, search, ctx }
    }

    fn fixture(editing: bool) -> Fixture {
        fixture_with(editing, Ok(""))
    }

    fn bound(fx: &Fixture, subpath: &str) -> Session {
        let mut session = Session::new(fx.ctx.clone());
        session.open(subpath).unwrap();
        session
    }

    fn send(session: &Session, value: serde_json::Value) -> Option<serde_json::Value> {
        session
            .handle_message(value.to_string().as_bytes())
            .map(|reply| serde_json::to_value(reply).unwrap())
    }

    #[test]
    fn open_binds_valid_subpaths_only() {
        let fx = fixture(false);
        let mut session = Session::new(fx.ctx.clone());
        assert!(matches!(
            session.open("../outside"),
            Err(SessionError::AuthorizationDenied { .. })
        ));
        assert!(matches!(session.state(), SessionState::Unbound));

        session.open("notes").unwrap();
        assert!(matches!(session.state(), SessionState::Bound { .. }));
        assert!(matches!(session.open("notes"), Err(SessionError::AlreadyBound)));
    }

    #[test]
    fn root_subpath_is_allowed() {
        let fx = fixture(false);
        let session = bound(&fx, "");
        let reply = send(&session, json!({"cmd": "text", "content": {"file": "notes/a"}})).unwrap();
        assert_eq!(reply["content"]["title"], "Shopping List");
    }

    #[test]
    fn text_returns_decoded_document() {
        let fx = fixture(false);
        let session = bound(&fx, "notes");

        let reply = send(&session, json!({"cmd": "text", "content": {"file": "a"}})).unwrap();

        assert_eq!(
            reply,
            json!({"cmd": "text", "content": {
                "file": "a", "title": "Shopping List", "tags": ["personal"],
                "body": "buy milk\nbuy eggs"
            }})
        );
    }

    #[test]
    fn text_with_query_highlights_matching_lines() {
        let fx = fixture_with(false, Ok("a:3:buy milk\n"));
        let session = bound(&fx, "notes");

        let reply =
            send(&session, json!({"cmd": "text", "content": {"file": "a", "query": "milk"}}))
                .unwrap();

        assert_eq!(reply["content"]["body"], "<span class=\"match\">buy milk</span>\nbuy eggs");
        let calls = fx.search.calls.lock().unwrap();
        assert_eq!(calls[0].1, fx.root.join("notes").join("a"));
    }

    #[test]
    fn text_with_failing_highlighter_still_answers() {
        let fx = fixture_with(false, Err(()));
        let session = bound(&fx, "notes");
        let reply =
            send(&session, json!({"cmd": "text", "content": {"file": "a", "query": "milk"}}))
                .unwrap();
        assert_eq!(reply["content"]["body"], "buy milk\nbuy eggs");
    }

    #[test]
    fn text_on_missing_file_and_directory_reply_with_error() {
        let fx = fixture(false);
        fs::create_dir_all(fx.root.join("notes").join("sub")).unwrap();
        let session = bound(&fx, "notes");

        let missing = send(&session, json!({"cmd": "text", "content": {"file": "nope"}})).unwrap();
        assert_eq!(missing["cmd"], "error");
        assert_eq!(missing["content"]["code"], "not_found");

        let dir = send(&session, json!({"cmd": "text", "content": {"file": "sub"}})).unwrap();
        assert_eq!(dir["content"]["code"], "is_directory");
    }

    #[test]
    fn sandbox_violations_get_no_reply() {
        let fx = fixture(true);
        fs::write(fx.root.join("secret"), "! Secret\n\n").unwrap();
        let session = bound(&fx, "notes");

        assert_eq!(send(&session, json!({"cmd": "text", "content": {"file": "../secret"}})), None);
        assert_eq!(send(&session, json!({"cmd": "delete", "content": "../secret"})), None);
        assert!(fx.root.join("secret").exists());
    }

    #[test]
    fn query_groups_results() {
        let fx = fixture_with(false, Ok("a:3:buy milk\n"));
        let session = bound(&fx, "notes");

        let reply = send(&session, json!({"cmd": "query", "content": "milk"})).unwrap();

        assert_eq!(
            reply,
            json!({"cmd": "results", "content": [
                {"file": "a", "num": 1, "text": [["3", "buy milk"]]}
            ]})
        );
        let calls = fx.search.calls.lock().unwrap();
        assert_eq!(calls[0], ("milk".to_string(), fx.root.join("notes")));
    }

    #[test]
    fn query_with_failing_collaborator_returns_empty_results() {
        let fx = fixture_with(false, Err(()));
        let session = bound(&fx, "notes");
        let reply = send(&session, json!({"cmd": "query", "content": "milk"})).unwrap();
        assert_eq!(reply, json!({"cmd": "results", "content": []}));
    }

    #[test]
    fn writes_are_silently_dropped_when_read_only() {
        let fx = fixture(false);
        let session = bound(&fx, "notes");

        assert_eq!(send(&session, json!({"cmd": "delete", "content": "a"})), None);
        assert_eq!(
            send(&session, json!({"cmd": "save", "content": {
                "file": "a", "title": "X", "tags": [], "body": ""
            }})),
            None
        );
        assert_eq!(send(&session, json!({"cmd": "create", "content": {"title": "New"}})), None);
        assert!(fx.root.join("notes").join("a").exists());
        assert!(!fx.root.join("notes").join("new").exists());
    }

    #[test]
    fn create_derives_name_and_disambiguates() {
        let fx = fixture(true);
        let session = bound(&fx, "notes");

        let create = json!({"cmd": "create", "content": {"title": "My New Note!"}});
        let first = send(&session, create.clone()).unwrap();
        let second = send(&session, create).unwrap();

        assert_eq!(first["content"]["file"], "my_new_note");
        assert_eq!(first["content"]["title"], "My New Note!");
        assert_eq!(second["content"]["file"], "my_new_note_1");
        assert_eq!(
            fs::read_to_string(fx.root.join("notes").join("my_new_note")).unwrap(),
            "! My New Note! \n\n"
        );
    }

    #[test]
    fn create_with_empty_title_is_malformed() {
        let fx = fixture(true);
        let session = bound(&fx, "notes");
        let reply = send(&session, json!({"cmd": "create", "content": {"title": "  "}})).unwrap();
        assert_eq!(reply["content"]["code"], "malformed");
    }

    #[test]
    fn save_overwrites_and_returns_text() {
        let fx = fixture(true);
        let session = bound(&fx, "notes");
        fs::write(fx.root.join("notes").join("shopping_list"), "! Shopping List\n\n").unwrap();

        let reply = send(&session, json!({"cmd": "save", "content": {
            "file": "shopping_list", "title": "Shopping List", "tags": ["home"], "body": "bread"
        }}))
        .unwrap();

        assert_eq!(reply["cmd"], "text");
        assert_eq!(reply["content"]["tags"], json!(["home"]));
        assert_eq!(reply["content"]["body"], "bread");
    }

    #[test]
    fn save_rejects_title_that_would_reload_as_tags() {
        let fx = fixture(true);
        let session = bound(&fx, "notes");

        let reply = send(&session, json!({"cmd": "save", "content": {
            "file": "a", "title": "Issue #42", "tags": [], "body": "x"
        }}))
        .unwrap();

        assert_eq!(reply["content"]["code"], "malformed");
        assert_eq!(
            fs::read_to_string(fx.root.join("notes").join("a")).unwrap(),
            "! Shopping List #personal\n\nbuy milk\nbuy eggs"
        );
    }

    #[test]
    fn separated_save_rejects_untagged_body_starting_with_tag_marker() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("plan"), "Plan\n\nold").unwrap();
        let mut config = DaemonConfig { root: tmp.path().to_path_buf(), ..DaemonConfig::default() };
        config.editing.enabled = true;
        config.document.layout = HeaderLayout::Separated;
        let collaborator =
            Arc::new(FakeCollaborator { output: Ok(String::new()), calls: Mutex::new(Vec::new()) });
        let ctx = Arc::new(DaemonContext::new(config, collaborator).unwrap());
        let mut session = Session::new(ctx);
        session.open("").unwrap();

        let rejected = send(&session, json!({"cmd": "save", "content": {
            "file": "plan", "title": "Plan", "tags": [], "body": "#heading\nline"
        }}))
        .unwrap();
        assert_eq!(rejected["content"]["code"], "malformed");
        assert_eq!(fs::read_to_string(tmp.path().join("plan")).unwrap(), "Plan\n\nold");

        let saved = send(&session, json!({"cmd": "save", "content": {
            "file": "plan", "title": "Plan", "tags": ["work"], "body": "#heading\nline"
        }}))
        .unwrap();
        assert_eq!(saved["cmd"], "text");
        assert_eq!(saved["content"]["tags"], json!(["work"]));
        assert_eq!(saved["content"]["body"], "#heading\nline");
    }

    #[test]
    fn save_with_new_title_sends_rename() {
        let fx = fixture(true);
        let session = bound(&fx, "notes");

        let reply = send(&session, json!({"cmd": "save", "content": {
            "file": "a", "title": "Groceries", "tags": [], "body": "milk"
        }}))
        .unwrap();

        assert_eq!(reply, json!({"cmd": "rename", "content": ["a", "groceries"]}));
        assert!(!fx.root.join("notes").join("a").exists());
        assert!(fx.root.join("notes").join("groceries").exists());
    }

    #[test]
    fn save_respects_rename_switch() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a"), "! A\n\n").unwrap();
        let mut config = DaemonConfig { root: tmp.path().to_path_buf(), ..DaemonConfig::default() };
        config.editing.enabled = true;
        config.editing.rename_on_save = false;
        let collaborator =
            Arc::new(FakeCollaborator { output: Ok(String::new()), calls: Mutex::new(Vec::new()) });
        let ctx = Arc::new(DaemonContext::new(config, collaborator).unwrap());
        let mut session = Session::new(ctx);
        session.open("").unwrap();

        let reply = send(&session, json!({"cmd": "save", "content": {
            "file": "a", "title": "Groceries", "tags": [], "body": ""
        }}))
        .unwrap();

        assert_eq!(reply["cmd"], "text");
        assert_eq!(reply["content"]["file"], "a");
        assert!(tmp.path().join("a").exists());
    }

    #[test]
    fn delete_removes_file_without_reply() {
        let fx = fixture(true);
        fs::create_dir_all(fx.root.join("notes").join("dir")).unwrap();
        let session = bound(&fx, "notes");

        assert_eq!(send(&session, json!({"cmd": "delete", "content": "a"})), None);
        assert!(!fx.root.join("notes").join("a").exists());

        assert_eq!(send(&session, json!({"cmd": "delete", "content": "dir"})), None);
        assert!(fx.root.join("notes").join("dir").is_dir());
    }

    #[test]
    fn create_or_open_opens_existing_and_creates_missing() {
        let fx = fixture(true);
        let session = bound(&fx, "notes");

        let existing = send(&session, json!({"cmd": "create_or_open", "content": {
            "file": "a", "title": "Ignored"
        }}))
        .unwrap();
        assert_eq!(existing["content"]["title"], "Shopping List");

        let created = send(&session, json!({"cmd": "create_or_open", "content": {
            "file": "journal", "title": "Journal"
        }}))
        .unwrap();
        assert_eq!(created["content"]["file"], "journal");
        assert_eq!(created["content"]["title"], "Journal");
        assert!(fx.root.join("notes").join("journal").exists());
    }

    #[test]
    fn create_or_open_read_only_does_not_create() {
        let fx = fixture(false);
        let session = bound(&fx, "notes");
        let reply = send(&session, json!({"cmd": "create_or_open", "content": {
            "file": "journal", "title": "Journal"
        }}))
        .unwrap();
        assert_eq!(reply["content"]["code"], "not_found");
        assert!(!fx.root.join("notes").join("journal").exists());
    }

    #[test]
    fn malformed_frames_get_error_reply() {
        let fx = fixture(false);
        let session = bound(&fx, "notes");

        let reply = session.handle_message(b"{not json").unwrap();
        assert!(matches!(reply, ServerMessage::Error(ref p) if p.code == ErrorCode::Malformed));

        let unknown = send(&session, json!({"cmd": "explode", "content": ""})).unwrap();
        assert_eq!(unknown["content"]["code"], "malformed");
    }

    #[test]
    fn closed_session_ignores_commands() {
        let fx = fixture(false);
        let mut session = bound(&fx, "notes");
        session.close();

        assert!(matches!(session.state(), SessionState::Closed));
        assert_eq!(send(&session, json!({"cmd": "text", "content": {"file": "a"}})), None);
        assert!(matches!(session.open("notes"), Err(SessionError::Closed)));
    }
}
