//! Headless bot: connects with a token, wanders, swings and throws, and
//! prints what the server sends back.

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use shared::{ClientIntent, ServerEvent};
use std::time::Duration;
use tokio::time::{interval, sleep, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser, Debug)]
#[command(about = "SwordForge test client")]
struct Args {
    /// Server WebSocket URL
    #[arg(short, long, default_value = "ws://127.0.0.1:8080")]
    url: String,

    /// Authentication token
    #[arg(short, long)]
    token: String,

    /// How long to play, in seconds
    #[arg(short, long, default_value = "10")]
    seconds: u64,
}

fn frame(intent: &ClientIntent) -> Result<Message, serde_json::Error> {
    Ok(Message::Text(serde_json::to_string(intent)?))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let url = format!("{}/?token={}", args.url.trim_end_matches('/'), args.token);

    println!("Connecting to {}", args.url);
    let (ws, _) = connect_async(url.as_str()).await?;
    let (mut write, mut read) = ws.split();

    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    let mut actions = interval(Duration::from_millis(500));
    let mut step: u32 = 0;
    let mut snapshots: u64 = 0;
    let mut player_id = None;

    loop {
        tokio::select! {
            _ = actions.tick() => {
                if Instant::now() >= deadline {
                    break;
                }
                step += 1;
                let angle = step as f32 * 0.7;
                write.send(frame(&ClientIntent::PlayerMove {
                    velocity_x: angle.cos() * 200.0,
                    velocity_y: angle.sin() * 200.0,
                    facing_angle: angle,
                })?).await?;
                if step % 2 == 0 {
                    write.send(frame(&ClientIntent::PlayerAttack)?).await?;
                }
                if step % 5 == 0 {
                    write.send(frame(&ClientIntent::ThrowSword { angle })?).await?;
                }
                if step % 10 == 0 {
                    write.send(frame(&ClientIntent::Respawn)?).await?;
                }
            }
            message = read.next() => {
                let Some(message) = message else {
                    println!("Server closed the connection");
                    break;
                };
                let Message::Text(text) = message? else {
                    continue;
                };
                match serde_json::from_str::<ServerEvent>(&text) {
                    Ok(ServerEvent::Init { player_id: id, world_size, players, enemies, .. }) => {
                        player_id = Some(id);
                        println!(
                            "Joined as player {} in a {} world ({} players, {} enemies)",
                            id, world_size, players.len(), enemies.len()
                        );
                    }
                    Ok(ServerEvent::GameState { tick, players, .. }) => {
                        snapshots += 1;
                        if snapshots % 60 == 0 {
                            if let Some(me) = players.iter().find(|p| Some(p.id) == player_id) {
                                println!(
                                    "Tick {}: at ({:.0}, {:.0}) health {:.0}",
                                    tick, me.x, me.y, me.health
                                );
                            }
                        }
                    }
                    Ok(ServerEvent::SwordUpdate(_)) => {}
                    Ok(other) => println!("Event: {}", other.name()),
                    Err(e) => println!("Failed to parse frame: {}", e),
                }
            }
        }
    }

    write.send(Message::Close(None)).await?;
    sleep(Duration::from_millis(100)).await;
    println!("Test client finished after {} snapshots", snapshots);
    Ok(())
}
