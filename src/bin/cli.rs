// Live Poll CLI
// Drives a running poll server over HTTP and WebSocket for manual checks and scripted validation

use clap::{Parser, Subcommand};
use colored::*;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::time::{timeout, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

#[derive(Parser)]
#[command(name = "poll-cli")]
#[command(about = "Live Poll Server CLI", long_about = None)]
struct Cli {
    /// Server address (default: 127.0.0.1:3000)
    #[arg(short, long, default_value = "127.0.0.1:3000")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server health endpoint
    Health,

    /// Create a room as admin
    CreateRoom {
        /// Admin display name
        #[arg(short, long)]
        admin: String,
    },

    /// Register a student in a room
    JoinRoom {
        #[arg(short, long)]
        room_code: String,

        #[arg(short, long)]
        name: String,
    },

    /// End a room and disconnect its participants
    EndRoom {
        #[arg(short, long)]
        room_code: String,
    },

    /// Print the current room snapshot
    GetRoom {
        #[arg(short, long)]
        room_code: String,
    },

    /// Bind a WebSocket to a room and print every event until the room ends
    Watch {
        #[arg(short, long)]
        room_code: String,

        #[arg(short, long)]
        user: String,

        /// Join as the room admin
        #[arg(long)]
        admin: bool,
    },

    /// Post a question as admin and follow its countdown
    Post {
        #[arg(short, long)]
        room_code: String,

        /// Question text
        #[arg(short, long)]
        text: String,

        /// Answer options (repeatable)
        #[arg(short, long)]
        option: Vec<String>,

        /// Countdown in seconds
        #[arg(long, default_value_t = 30)]
        timer: u32,
    },

    /// Submit an answer to the open question
    Answer {
        #[arg(short, long)]
        room_code: String,

        #[arg(short, long)]
        user: String,

        #[arg(short, long)]
        answer: String,
    },

    /// Run an end-to-end poll against the server
    Validate {
        /// Countdown used for the validation question
        #[arg(long, default_value_t = 3)]
        timer: u32,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Health => check_health(&cli.server).await,
        Commands::CreateRoom { admin } => {
            if let Some(code) = create_room(&cli.server, admin).await {
                println!("\n{}", "═".repeat(40).green());
                println!("{} {}", "Room code:".bold(), code.green().bold());
                println!("{}", "═".repeat(40).green());
            }
        }
        Commands::JoinRoom { room_code, name } => {
            join_room(&cli.server, room_code, name).await;
        }
        Commands::EndRoom { room_code } => end_room(&cli.server, room_code).await,
        Commands::GetRoom { room_code } => {
            if let Some(room) = get_room(&cli.server, room_code).await {
                println!("{}", serde_json::to_string_pretty(&room).unwrap_or_default());
            }
        }
        Commands::Watch {
            room_code,
            user,
            admin,
        } => watch(&cli.server, room_code, user, *admin).await,
        Commands::Post {
            room_code,
            text,
            option,
            timer,
        } => post_question(&cli.server, room_code, text, option, *timer).await,
        Commands::Answer {
            room_code,
            user,
            answer,
        } => submit_answer(&cli.server, room_code, user, answer).await,
        Commands::Validate { timer } => {
            if validate_poll_flow(&cli.server, *timer).await {
                println!("\n{} Validation passed", "✓".green().bold());
            } else {
                println!("\n{} Validation failed", "✗".red().bold());
                std::process::exit(1);
            }
        }
    }
}

async fn check_health(server: &str) {
    println!("{}", "Checking server health...".cyan());

    let url = format!("http://{}/health", server);
    match reqwest::get(&url).await {
        Ok(resp) => {
            let status = resp.status();
            if status.is_success() {
                println!("{} Health check passed", "✓".green());

                if let Ok(body) = resp.json::<Value>().await {
                    println!("  Status: {}", body["status"].as_str().unwrap_or("unknown"));
                    println!("  Service: {}", body["service"].as_str().unwrap_or("unknown"));
                    println!("  Version: {}", body["version"].as_str().unwrap_or("unknown"));
                }
            } else {
                println!("{} Health check failed: {}", "✗".red(), status);
            }
        }
        Err(e) => {
            println!("{} Cannot connect to server: {}", "✗".red(), e);
            println!("  Make sure the server is running on {}", server);
        }
    }
}

async fn post_json(server: &str, path: &str, body: Value) -> Option<Value> {
    let url = format!("http://{}/{}", server, path);
    let client = reqwest::Client::new();

    match client.post(&url).json(&body).send().await {
        Ok(resp) => {
            let status = resp.status();
            let body = resp.json::<Value>().await.unwrap_or(Value::Null);
            if status.is_success() {
                Some(body)
            } else {
                println!(
                    "{} {} failed ({}): {}",
                    "✗".red(),
                    path,
                    status,
                    body["error"].as_str().unwrap_or("unknown error")
                );
                None
            }
        }
        Err(e) => {
            println!("{} Cannot connect to server: {}", "✗".red(), e);
            None
        }
    }
}

async fn create_room(server: &str, admin: &str) -> Option<String> {
    println!("{}", "Creating room...".cyan());
    let body = post_json(server, "create-room", json!({ "adminName": admin })).await?;
    let code = body["roomCode"].as_str()?.to_string();
    println!("{} Room created by {}", "✓".green(), admin);
    Some(code)
}

async fn join_room(server: &str, room_code: &str, name: &str) -> bool {
    let body = json!({ "roomCode": room_code, "studentName": name });
    let joined = post_json(server, "join-room", body).await.is_some();
    if joined {
        println!("{} {} joined room {}", "✓".green(), name, room_code);
    }
    joined
}

async fn end_room(server: &str, room_code: &str) {
    if post_json(server, "end-room", json!({ "roomCode": room_code }))
        .await
        .is_some()
    {
        println!("{} Room {} ended", "✓".green(), room_code);
    }
}

async fn get_room(server: &str, room_code: &str) -> Option<Value> {
    let url = format!("http://{}/room/{}", server, urlencoding::encode(room_code));

    match reqwest::get(&url).await {
        Ok(resp) if resp.status().is_success() => resp.json::<Value>().await.ok(),
        Ok(resp) => {
            println!("{} Room lookup failed: {}", "✗".red(), resp.status());
            None
        }
        Err(e) => {
            println!("{} Cannot connect to server: {}", "✗".red(), e);
            None
        }
    }
}

/// Open a WebSocket and announce the given identity.
async fn connect_bound(server: &str, room_code: &str, user: &str, is_admin: bool) -> Option<WsStream> {
    let url = format!("ws://{}/", server);

    let (mut ws_stream, _) = match connect_async(&url).await {
        Ok(pair) => pair,
        Err(e) => {
            println!("{} WebSocket connection failed: {}", "✗".red(), e);
            return None;
        }
    };

    let join = json!({
        "type": "join",
        "roomCode": room_code,
        "user": user,
        "isAdmin": is_admin,
    });
    if ws_stream.send(Message::Text(join.to_string())).await.is_err() {
        println!("{} Failed to send join message", "✗".red());
        return None;
    }
    Some(ws_stream)
}

async fn next_event(ws_stream: &mut WsStream, wait: Duration) -> Option<Value> {
    loop {
        match timeout(wait, ws_stream.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => return serde_json::from_str(&text).ok(),
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) => return None,
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(e))) => {
                println!("{} Connection error: {}", "✗".red(), e);
                return None;
            }
            Err(_) => return None,
        }
    }
}

fn print_event(event: &Value) {
    match event["type"].as_str() {
        Some("poll") if event["question"].is_null() => {
            println!("{} {}", "◀".green(), "poll closed".yellow());
        }
        Some("poll") => {
            println!(
                "{} {} {}",
                "◀".green(),
                "new question:".bold(),
                event["question"]
            );
        }
        Some("timer") => println!("{} timer {}", "◀".green(), event["timer"]),
        Some("update") => {
            let students = event["room"]["students"]
                .as_object()
                .map(|s| s.len())
                .unwrap_or(0);
            println!("{} update ({} students)", "◀".green(), students);
        }
        Some("end") => println!("{} {}", "◀".green(), "room ended".red()),
        _ => println!("{} {}", "◀".green(), event.to_string().bright_white()),
    }
}

async fn watch(server: &str, room_code: &str, user: &str, is_admin: bool) {
    let Some(mut ws_stream) = connect_bound(server, room_code, user, is_admin).await else {
        return;
    };
    println!("{} Watching room {} as {}", "✓".green(), room_code.bold(), user);
    println!("Press {} to disconnect.", "Ctrl+C".bold());

    while let Some(event) = next_event(&mut ws_stream, Duration::from_secs(3600)).await {
        print_event(&event);
        if event["type"] == "end" {
            break;
        }
    }
}

async fn post_question(server: &str, room_code: &str, text: &str, options: &[String], timer: u32) {
    let Some(mut ws_stream) = connect_bound(server, room_code, "admin", true).await else {
        return;
    };

    let poll = json!({
        "type": "poll",
        "roomCode": room_code,
        "question": { "text": text, "options": options, "timer": timer },
    });
    if ws_stream.send(Message::Text(poll.to_string())).await.is_err() {
        println!("{} Failed to send poll message", "✗".red());
        return;
    }
    println!("{} Question posted, following countdown...", "✓".green());

    let wait = Duration::from_secs(u64::from(timer) + 5);
    while let Some(event) = next_event(&mut ws_stream, wait).await {
        print_event(&event);
        let closed = event["type"] == "poll" && event["question"].is_null();
        if closed || event["type"] == "end" {
            break;
        }
    }
}

async fn submit_answer(server: &str, room_code: &str, user: &str, answer: &str) {
    if send_answer(server, room_code, user, answer).await {
        println!("{} Answer recorded", "✓".green());
    } else {
        println!("{} No acknowledgement (is a question open?)", "✗".yellow());
    }
}

/// Send one answer on a short-lived socket and wait for the room update.
/// The socket joins with an empty user so closing it does not remove the
/// student from the room.
async fn send_answer(server: &str, room_code: &str, user: &str, answer: &str) -> bool {
    let Some(mut ws_stream) = connect_bound(server, room_code, "", false).await else {
        return false;
    };

    let message = json!({
        "type": "answer",
        "roomCode": room_code,
        "user": user,
        "answer": answer,
    });
    if ws_stream.send(Message::Text(message.to_string())).await.is_err() {
        println!("{} Failed to send answer", "✗".red());
        return false;
    }

    while let Some(event) = next_event(&mut ws_stream, Duration::from_secs(5)).await {
        if event["type"] == "update" {
            return event["room"]["currentQuestion"]["responses"][user] == answer;
        }
    }
    false
}

async fn validate_poll_flow(server: &str, timer: u32) -> bool {
    println!("{}", "Validating full poll flow...".cyan());

    let Some(code) = create_room(server, "validator").await else {
        return false;
    };

    for student in ["alice", "bob"] {
        if !join_room(server, &code, student).await {
            return false;
        }
    }
    if join_room(server, &code, "alice").await {
        println!("{} Duplicate student name was accepted", "✗".red());
        return false;
    }
    println!("{} Duplicate student name rejected", "✓".green());

    let Some(mut admin) = connect_bound(server, &code, "validator", true).await else {
        return false;
    };
    let mut students = Vec::new();
    for student in ["alice", "bob"] {
        let Some(ws) = connect_bound(server, &code, student, false).await else {
            return false;
        };
        students.push((student, ws));
    }

    let poll = json!({
        "type": "poll",
        "roomCode": code,
        "question": { "text": "Validation question", "options": ["A", "B"], "timer": timer },
    });
    if admin.send(Message::Text(poll.to_string())).await.is_err() {
        return false;
    }
    match next_event(&mut admin, Duration::from_secs(5)).await {
        Some(event) if event["type"] == "poll" && !event["question"].is_null() => {
            println!("{} Question opened", "✓".green());
        }
        _ => {
            println!("{} Question was not broadcast", "✗".red());
            return false;
        }
    }

    for (student, ws) in students.iter_mut() {
        let answer = json!({
            "type": "answer",
            "roomCode": code,
            "user": *student,
            "answer": format!("{}-answer", student),
        });
        if ws.send(Message::Text(answer.to_string())).await.is_err() {
            return false;
        }
    }

    let mut ticks = 0;
    let wait = Duration::from_secs(u64::from(timer) + 5);
    let mut closed = false;
    while let Some(event) = next_event(&mut admin, wait).await {
        if event["type"] == "timer" {
            ticks += 1;
        }
        if event["type"] == "poll" && event["question"].is_null() {
            closed = true;
            break;
        }
    }
    if !closed {
        println!("{} Poll never closed", "✗".red());
        return false;
    }
    println!("{} Poll closed after {} ticks", "✓".green(), ticks);

    let Some(room) = get_room(server, &code).await else {
        return false;
    };
    let mut ok = room["currentQuestion"].is_null();
    for student in ["alice", "bob"] {
        let expected = format!("{}-answer", student);
        ok &= room["questions"][0]["responses"][student] == expected.as_str();
        ok &= room["students"][student]["answers"]["0"] == expected.as_str();
    }
    if ok {
        println!("{} Answers recorded on question and students", "✓".green());
    } else {
        println!("{} Room state mismatch:\n{}", "✗".red(), room);
    }

    for round in 1..=2 {
        let poll = json!({
            "type": "poll",
            "roomCode": code,
            "question": { "text": format!("Follow-up {}", round), "options": ["A", "B"], "timer": 30 },
        });
        if admin.send(Message::Text(poll.to_string())).await.is_err() {
            return false;
        }
        loop {
            match next_event(&mut admin, Duration::from_secs(5)).await {
                Some(event) if event["type"] == "poll" && !event["question"].is_null() => break,
                Some(_) => continue,
                None => {
                    println!("{} Follow-up question was not broadcast", "✗".red());
                    return false;
                }
            }
        }
        if !send_answer(server, &code, "alice", "A").await {
            println!("{} One-shot answer {} was not recorded", "✗".red(), round);
            ok = false;
        }
    }

    let Some(room) = get_room(server, &code).await else {
        return false;
    };
    let kept = room["students"]["alice"]["answers"]["1"] == "A"
        && room["students"]["alice"]["answers"]["2"] == "A";
    if kept {
        println!("{} One-shot answers kept the student in the room", "✓".green());
    } else {
        println!("{} One-shot answers lost the student:\n{}", "✗".red(), room);
        ok = false;
    }

    end_room(server, &code).await;
    let mut ended = false;
    while let Some(event) = next_event(&mut admin, Duration::from_secs(2)).await {
        if event["type"] == "end" {
            ended = true;
            break;
        }
    }
    if ended {
        println!("{} End event delivered", "✓".green());
    } else {
        println!("{} End event missing", "✗".red());
        ok = false;
    }

    ok && ticks == timer
}
