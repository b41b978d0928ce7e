//! Basic usage example for the Forge SDK
//!
//! This example demonstrates the core features of the Forge Rust SDK:
//! - Connecting to an engine session
//! - Building lazy pipeline chains
//! - Running commands and reading output
//! - Composing reusable chain fragments with `with_`
//! - Forcing evaluation with `sync`
//!
//! Requires a running engine (set `endpoint` below) or a session binary on
//! `$FORGE_SESSION`. Run with: cargo run --example basic_usage

use forge_sdk::{Config, Connection, Container, Error};

fn base_env(c: Container) -> Container {
    c.with_env_variable("CI", "true")
        .with_env_variable("TERM", "dumb")
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();
    println!("=== Forge SDK Basic Usage Example ===\n");

    // 1. Connect to the engine
    println!("1. Connecting...");
    let conn = Connection::connect(Config::default()).await?;
    let client = conn.client();
    println!("   ✓ Session open\n");

    // 2. Build a pipeline lazily - nothing executes yet
    println!("2. Building a pipeline...");
    let alpine = client
        .container()
        .from("alpine:3.16.2")
        .with_(base_env)
        .with_workdir("/src");
    println!("   ✓ Chain built (no engine round trip so far)\n");

    // 3. A terminal call triggers execution
    println!("3. Running a command...");
    let version = alpine
        .with_exec(vec!["cat", "/etc/alpine-release"])
        .stdout()
        .await?;
    println!("   alpine version: {}", version.trim());

    // 4. Branching: both branches share the base, neither affects the other
    println!("4. Branching the chain...");
    let with_spam = alpine.with_env_variable("SPAM", "eggs");
    let spam = with_spam
        .with_exec(vec!["printenv", "SPAM"])
        .stdout()
        .await?;
    println!("   SPAM={}", spam.trim());

    // 5. Build a directory and read it back
    println!("5. Directory round trip...");
    let dir = client
        .directory()
        .with_new_file("hello.txt", "Hello, world!")
        .with_new_file("goodbye.txt", "Goodbye, world!");
    let entries = dir.entries().await?;
    println!("   entries: {:?}", entries);

    // 6. Force evaluation, then keep chaining
    println!("6. Forcing evaluation with sync...");
    let built = alpine.with_exec(vec!["echo", "ready"]).sync().await?;
    let out = built.stdout().await?;
    println!("   output: {}", out.trim());

    conn.close().await;
    println!("\n=== Example completed successfully ===");
    Ok(())
}
