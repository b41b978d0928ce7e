//! In-process mock engine transport
//!
//! Parses the SDK's serialized query documents and interprets them against a
//! small in-memory model: directories are sorted path->contents maps,
//! containers carry their base image, env, mounts and last exec. Engine-side
//! failures (unknown executables, missing files) are reported through the
//! `errors` side of the response envelope, exactly like the real engine.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use forge_sdk::{EngineError, QueryResponse, Transport};
use serde_json::Value as Json;

/// One parsed field access with its arguments.
#[derive(Debug, Clone)]
pub struct Call {
    pub field: String,
    pub args: HashMap<String, Json>,
}

type Dir = BTreeMap<String, String>;

#[derive(Debug, Clone, Default)]
struct ContainerState {
    base: Option<String>,
    platform: Option<String>,
    env: Vec<(String, String)>,
    mounts: BTreeMap<String, Dir>,
    cache_mounts: BTreeMap<String, String>,
    workdir: Option<String>,
    entrypoint: Vec<String>,
    exec: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
enum Object {
    Directory(Dir),
    Container(ContainerState),
    Cache(String),
}

/// Cursor while walking a chain root-to-leaf.
enum Node {
    Root,
    Container(Box<ContainerState>),
    Directory(Dir),
    File(Result<String, String>),
    GitRepo { url: String },
    GitRef { url: String, name: String },
    Host,
    Cache(String),
    Leaf(Json),
}

pub struct MockEngine {
    objects: Mutex<HashMap<String, Object>>,
    git_trees: Mutex<HashMap<(String, String), Dir>>,
    host_dirs: Mutex<HashMap<String, Dir>>,
    next_id: AtomicUsize,
    requests: AtomicUsize,
}

impl MockEngine {
    pub fn new() -> Self {
        MockEngine {
            objects: Mutex::new(HashMap::new()),
            git_trees: Mutex::new(HashMap::new()),
            host_dirs: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(1),
            requests: AtomicUsize::new(0),
        }
    }

    /// Seed the tree served for `url` at ref `name`.
    pub fn seed_git_tree(&self, url: &str, name: &str, files: &[(&str, &str)]) {
        let dir: Dir = files
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect();
        self.git_trees
            .lock()
            .unwrap()
            .insert((url.to_string(), name.to_string()), dir);
    }

    /// Seed a host directory.
    pub fn seed_host_dir(&self, path: &str, files: &[(&str, &str)]) {
        let dir: Dir = files
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect();
        self.host_dirs.lock().unwrap().insert(path.to_string(), dir);
    }

    /// Number of round trips served so far.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn register(&self, kind: &str, object: Object) -> String {
        let id = format!("{}:{}", kind, self.next_id.fetch_add(1, Ordering::SeqCst));
        self.objects.lock().unwrap().insert(id.clone(), object);
        id
    }

    fn lookup_directory(&self, id: &str) -> Result<Dir, String> {
        match self.objects.lock().unwrap().get(id) {
            Some(Object::Directory(dir)) => Ok(dir.clone()),
            Some(_) => Err(format!("id {:?} is not a directory", id)),
            None => Err(format!("unknown object id {:?}", id)),
        }
    }

    fn lookup_container(&self, id: &str) -> Result<ContainerState, String> {
        match self.objects.lock().unwrap().get(id) {
            Some(Object::Container(state)) => Ok(state.clone()),
            Some(_) => Err(format!("id {:?} is not a container", id)),
            None => Err(format!("unknown object id {:?}", id)),
        }
    }

    fn lookup_cache(&self, id: &str) -> Result<String, String> {
        match self.objects.lock().unwrap().get(id) {
            Some(Object::Cache(key)) => Ok(key.clone()),
            Some(_) => Err(format!("id {:?} is not a cache volume", id)),
            None => Err(format!("unknown object id {:?}", id)),
        }
    }

    async fn evaluate(&self, calls: &[Call]) -> Result<Json, String> {
        let mut node = Node::Root;
        for call in calls {
            node = self.step(node, call).await?;
        }
        match node {
            Node::Leaf(value) => Ok(value),
            _ => Err(format!(
                "query ended on a non-scalar field {:?}",
                calls.last().map(|c| c.field.as_str()).unwrap_or("")
            )),
        }
    }

    async fn step(&self, node: Node, call: &Call) -> Result<Node, String> {
        let field = call.field.as_str();
        match node {
            Node::Root => match field {
                "container" => {
                    let mut state = ContainerState::default();
                    state.platform = arg_str_opt(call, "platform");
                    Ok(Node::Container(Box::new(state)))
                }
                "directory" => Ok(Node::Directory(Dir::new())),
                "git" => Ok(Node::GitRepo {
                    url: arg_str(call, "url")?,
                }),
                "host" => Ok(Node::Host),
                "cacheVolume" => Ok(Node::Cache(arg_str(call, "key")?)),
                _ => Err(format!("unknown root field {:?}", field)),
            },

            Node::Container(mut state) => match field {
                "from" => {
                    state.base = Some(arg_str(call, "address")?);
                    Ok(Node::Container(state))
                }
                "build" => {
                    let context = self.lookup_directory(&arg_str(call, "context")?)?;
                    if !context.contains_key("Dockerfile") {
                        return Err("build failed: no Dockerfile in context".to_string());
                    }
                    let mut built = ContainerState {
                        base: Some("build".to_string()),
                        platform: state.platform.clone(),
                        ..ContainerState::default()
                    };
                    // Build args become env, observable via printenv.
                    if let Some(Json::Array(args)) = call.args.get("buildArgs") {
                        for arg in args {
                            let name = arg["name"].as_str().unwrap_or_default().to_string();
                            let value = arg["value"].as_str().unwrap_or_default().to_string();
                            built.env.push((name, value));
                        }
                    }
                    Ok(Node::Container(Box::new(built)))
                }
                "withExec" => {
                    state.exec = Some(arg_str_list(call, "args")?);
                    Ok(Node::Container(state))
                }
                "withEnvVariable" => {
                    let name = arg_str(call, "name")?;
                    let value = arg_str(call, "value")?;
                    state.env.retain(|(n, _)| n != &name);
                    state.env.push((name, value));
                    Ok(Node::Container(state))
                }
                "withMountedDirectory" => {
                    let path = arg_str(call, "path")?;
                    let source = self.lookup_directory(&arg_str(call, "source")?)?;
                    state.mounts.insert(path, source);
                    Ok(Node::Container(state))
                }
                "withMountedCache" => {
                    let path = arg_str(call, "path")?;
                    let key = self.lookup_cache(&arg_str(call, "cache")?)?;
                    state.cache_mounts.insert(path, key);
                    Ok(Node::Container(state))
                }
                "withExposedPort" => {
                    call.args
                        .get("port")
                        .and_then(|v| v.as_i64())
                        .ok_or("withExposedPort: missing required argument \"port\"")?;
                    Ok(Node::Container(state))
                }
                "withWorkdir" => {
                    state.workdir = Some(arg_str(call, "path")?);
                    Ok(Node::Container(state))
                }
                "withEntrypoint" => {
                    state.entrypoint = arg_str_list(call, "args")?;
                    Ok(Node::Container(state))
                }
                "stdout" => {
                    let out = self.run_exec(&state).await?;
                    Ok(Node::Leaf(Json::String(out)))
                }
                "stderr" => {
                    self.run_exec(&state).await?;
                    Ok(Node::Leaf(Json::String(String::new())))
                }
                "sync" => {
                    if state.exec.is_some() {
                        self.run_exec(&state).await?;
                    }
                    let id = self.register("container", Object::Container(*state));
                    Ok(Node::Leaf(Json::String(id)))
                }
                "id" => {
                    let id = self.register("container", Object::Container(*state));
                    Ok(Node::Leaf(Json::String(id)))
                }
                "export" => {
                    arg_str(call, "path")?;
                    if let Some(Json::Array(variants)) = call.args.get("platformVariants") {
                        for variant in variants {
                            let id = variant.as_str().ok_or("platformVariants must be ids")?;
                            self.lookup_container(id)?;
                        }
                    }
                    Ok(Node::Leaf(Json::Bool(true)))
                }
                _ => Err(format!("unknown container field {:?}", field)),
            },

            Node::Directory(mut dir) => match field {
                "withNewFile" => {
                    dir.insert(arg_str(call, "path")?, arg_str(call, "contents")?);
                    Ok(Node::Directory(dir))
                }
                "directory" => {
                    let prefix = format!("{}/", arg_str(call, "path")?.trim_end_matches('/'));
                    let sub: Dir = dir
                        .iter()
                        .filter_map(|(p, c)| {
                            p.strip_prefix(&prefix).map(|rel| (rel.to_string(), c.clone()))
                        })
                        .collect();
                    Ok(Node::Directory(sub))
                }
                "file" => {
                    let path = arg_str(call, "path")?;
                    Ok(Node::File(
                        dir.get(&path)
                            .cloned()
                            .ok_or(format!("no such file: {}", path)),
                    ))
                }
                "entries" => {
                    let entries: Vec<Json> = match arg_str_opt(call, "path") {
                        Some(path) => {
                            let prefix = format!("{}/", path.trim_end_matches('/'));
                            dir.keys()
                                .filter_map(|p| p.strip_prefix(&prefix))
                                .map(|rel| Json::String(rel.to_string()))
                                .collect()
                        }
                        None => dir.keys().map(|k| Json::String(k.clone())).collect(),
                    };
                    Ok(Node::Leaf(Json::Array(entries)))
                }
                "id" => {
                    let id = self.register("directory", Object::Directory(dir));
                    Ok(Node::Leaf(Json::String(id)))
                }
                _ => Err(format!("unknown directory field {:?}", field)),
            },

            Node::File(contents) => match field {
                "contents" => Ok(Node::Leaf(Json::String(contents?))),
                "size" => Ok(Node::Leaf(Json::from(contents?.len() as i64))),
                "id" => {
                    let id = self.register(
                        "file",
                        Object::Directory(Dir::from([("file".to_string(), contents?)])),
                    );
                    Ok(Node::Leaf(Json::String(id)))
                }
                _ => Err(format!("unknown file field {:?}", field)),
            },

            Node::GitRepo { url } => match field {
                "tag" | "branch" => Ok(Node::GitRef {
                    url,
                    name: arg_str(call, "name")?,
                }),
                _ => Err(format!("unknown git field {:?}", field)),
            },

            Node::GitRef { url, name } => match field {
                "tree" => {
                    let trees = self.git_trees.lock().unwrap();
                    let dir = trees
                        .get(&(url.clone(), name.clone()))
                        .cloned()
                        .ok_or(format!("unknown revision {:?} of {:?}", name, url))?;
                    Ok(Node::Directory(dir))
                }
                _ => Err(format!("unknown git ref field {:?}", field)),
            },

            Node::Host => match field {
                "directory" => {
                    let path = arg_str(call, "path")?;
                    let dirs = self.host_dirs.lock().unwrap();
                    let dir = dirs
                        .get(&path)
                        .cloned()
                        .ok_or(format!("host path not found: {}", path))?;
                    Ok(Node::Directory(dir))
                }
                _ => Err(format!("unknown host field {:?}", field)),
            },

            Node::Cache(key) => match field {
                "id" => {
                    let id = self.register("cache", Object::Cache(key));
                    Ok(Node::Leaf(Json::String(id)))
                }
                _ => Err(format!("unknown cache volume field {:?}", field)),
            },

            Node::Leaf(_) => Err(format!("cannot select {:?} on a scalar", field)),
        }
    }

    async fn run_exec(&self, state: &ContainerState) -> Result<String, String> {
        let args = state
            .exec
            .as_ref()
            .ok_or("container has no command output")?;
        let cmd = args.first().map(String::as_str).unwrap_or_default();
        match cmd {
            "echo" => Ok(args[1..].join(" ") + "\n"),
            "true" => Ok(String::new()),
            "sleep" => {
                let secs: f64 = args
                    .get(1)
                    .and_then(|s| s.parse().ok())
                    .ok_or("sleep: invalid interval")?;
                tokio::time::sleep(Duration::from_secs_f64(secs)).await;
                Ok(String::new())
            }
            "printenv" => Ok(state
                .env
                .iter()
                .map(|(k, v)| format!("{}={}\n", k, v))
                .collect()),
            "ls" => {
                let path = args.get(1).ok_or("ls: missing operand")?;
                let dir = state
                    .mounts
                    .get(path)
                    .ok_or(format!("ls: {}: No such file or directory", path))?;
                Ok(dir.keys().map(|k| format!("{}\n", k)).collect())
            }
            "cat" => {
                let path = args.get(1).ok_or("cat: missing operand")?;
                if path == "/etc/alpine-release" {
                    if let Some(base) = &state.base {
                        if let Some(version) = base.strip_prefix("alpine:") {
                            return Ok(format!("{}\n", version));
                        }
                    }
                }
                for (mount, dir) in &state.mounts {
                    if let Some(rel) = path.strip_prefix(&format!("{}/", mount)) {
                        return dir
                            .get(rel)
                            .cloned()
                            .ok_or(format!("cat: {}: No such file or directory", path));
                    }
                }
                Err(format!("cat: {}: No such file or directory", path))
            }
            "uname" => match state.platform.as_deref() {
                Some("linux/arm64") => Ok("aarch64\n".to_string()),
                _ => Ok("x86_64\n".to_string()),
            },
            other => Err(format!(
                "process \"{}\" did not complete successfully: executable file not found",
                other
            )),
        }
    }
}

#[async_trait]
impl Transport for MockEngine {
    async fn request(&self, query: &str) -> forge_sdk::Result<QueryResponse> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let calls = parse_document(query);
        match self.evaluate(&calls).await {
            Ok(leaf) => Ok(QueryResponse {
                data: Some(nest(&calls, leaf)),
                errors: None,
            }),
            Err(message) => Ok(QueryResponse {
                data: None,
                errors: Some(vec![EngineError { message }]),
            }),
        }
    }
}

/// Wrap the leaf value back into the nested object shape of the response.
fn nest(calls: &[Call], leaf: Json) -> Json {
    let mut value = leaf;
    for call in calls.iter().rev() {
        value = serde_json::json!({ call.field.clone(): value });
    }
    value
}

// --- query document parser -------------------------------------------------

/// Parse a serialized operation document back into its chain of calls.
///
/// Panics on malformed input: the serializer under test produced it, so any
/// parse failure is itself a test failure.
pub fn parse_document(query: &str) -> Vec<Call> {
    let mut parser = Parser {
        chars: query.chars().collect(),
        pos: 0,
    };
    parser.expect_word("query");
    let mut calls = Vec::new();
    let mut depth = 0;
    while parser.eat('{') {
        depth += 1;
        let field = parser.ident();
        let mut args = HashMap::new();
        if parser.eat('(') {
            loop {
                let name = parser.ident();
                parser.expect(':');
                let value = parser.value();
                args.insert(name, value);
                if !parser.eat(',') {
                    break;
                }
            }
            parser.expect(')');
        }
        calls.push(Call { field, args });
    }
    for _ in 0..depth {
        parser.expect('}');
    }
    assert!(
        parser.at_end(),
        "trailing input in document: {:?}",
        query
    );
    calls
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn skip_ws(&mut self) {
        while self.chars.get(self.pos).is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.chars.get(self.pos).copied()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) {
        assert!(
            self.eat(expected),
            "expected {:?} at position {}",
            expected,
            self.pos
        );
    }

    fn expect_word(&mut self, word: &str) {
        self.skip_ws();
        for c in word.chars() {
            assert_eq!(self.chars.get(self.pos).copied(), Some(c));
            self.pos += 1;
        }
    }

    fn at_end(&mut self) -> bool {
        self.skip_ws();
        self.pos == self.chars.len()
    }

    fn ident(&mut self) -> String {
        self.skip_ws();
        let start = self.pos;
        while self
            .chars
            .get(self.pos)
            .is_some_and(|c| c.is_alphanumeric() || *c == '_')
        {
            self.pos += 1;
        }
        assert!(self.pos > start, "expected identifier at {}", start);
        self.chars[start..self.pos].iter().collect()
    }

    fn value(&mut self) -> Json {
        match self.peek() {
            Some('"') => {
                // Capture the raw JSON string literal and let serde decode it.
                let start = self.pos;
                self.pos += 1;
                while let Some(&c) = self.chars.get(self.pos) {
                    self.pos += 1;
                    match c {
                        '\\' => self.pos += 1,
                        '"' => break,
                        _ => {}
                    }
                }
                let raw: String = self.chars[start..self.pos].iter().collect();
                serde_json::from_str(&raw).expect("invalid string literal")
            }
            Some('[') => {
                self.expect('[');
                let mut items = Vec::new();
                if self.peek() != Some(']') {
                    loop {
                        items.push(self.value());
                        if !self.eat(',') {
                            break;
                        }
                    }
                }
                self.expect(']');
                Json::Array(items)
            }
            Some('{') => {
                self.expect('{');
                let mut map = serde_json::Map::new();
                if self.peek() != Some('}') {
                    loop {
                        let key = self.ident();
                        self.expect(':');
                        map.insert(key, self.value());
                        if !self.eat(',') {
                            break;
                        }
                    }
                }
                self.expect('}');
                Json::Object(map)
            }
            Some(c) if c == '-' || c.is_ascii_digit() => {
                let start = self.pos;
                while self
                    .chars
                    .get(self.pos)
                    .is_some_and(|c| c.is_ascii_digit() || *c == '-' || *c == '.')
                {
                    self.pos += 1;
                }
                let raw: String = self.chars[start..self.pos].iter().collect();
                serde_json::from_str(&raw).expect("invalid number literal")
            }
            _ => {
                // Bare token: true/false or an enum name.
                let word = self.ident();
                match word.as_str() {
                    "true" => Json::Bool(true),
                    "false" => Json::Bool(false),
                    _ => Json::String(word),
                }
            }
        }
    }
}

// --- argument helpers ------------------------------------------------------

fn arg_str(call: &Call, name: &str) -> Result<String, String> {
    call.args
        .get(name)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or(format!(
            "{}: missing required argument {:?}",
            call.field, name
        ))
}

fn arg_str_opt(call: &Call, name: &str) -> Option<String> {
    call.args
        .get(name)
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn arg_str_list(call: &Call, name: &str) -> Result<Vec<String>, String> {
    match call.args.get(name) {
        Some(Json::Array(items)) => Ok(items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect()),
        _ => Err(format!(
            "{}: missing required argument {:?}",
            call.field, name
        )),
    }
}
