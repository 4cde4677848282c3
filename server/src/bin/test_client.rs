use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use shared::{ActionRequest, ClientEvent, MatchSnapshot, Position, ServerEvent};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Scripted client: joins matchmaking, then on each of its turns steps toward
/// the opponent and ends the turn.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address
    #[clap(short = 'H', long, default_value = "127.0.0.1:8080")]
    server: String,
    /// Player identity sent in the handshake
    #[clap(short, long, default_value = "test-player")]
    player: String,
    /// Display name
    #[clap(short, long, default_value = "Test Player")]
    name: String,
    /// Number of own turns to play before disconnecting
    #[clap(short, long, default_value = "3")]
    turns: u32,
}

/// One cell closer to `to` along x first, then y.
fn step_toward(from: Position, to: Position) -> Option<Position> {
    let dx = (to.x - from.x).signum();
    let dy = (to.y - from.y).signum();
    let next = if dx != 0 {
        Position::new(from.x + dx, from.y)
    } else if dy != 0 {
        Position::new(from.x, from.y + dy)
    } else {
        return None;
    };
    // Stop short of the opponent's cell
    (next != to).then_some(next)
}

fn plan_move(state: &MatchSnapshot, me: &str) -> Option<Position> {
    let mine = state.players.iter().find(|p| p.id == me)?;
    let theirs = state.players.iter().find(|p| p.id != me)?;
    step_toward(mine.position, theirs.position)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    let query = serde_urlencoded::to_string([
        ("player", args.player.as_str()),
        ("name", args.name.as_str()),
    ])?;
    let url = format!("ws://{}/?{}", args.server, query);

    println!("Connecting to {}", url);
    let (socket, _) = connect_async(url.as_str()).await?;
    let (mut sink, mut stream) = socket.split();

    sink.send(Message::Text(ClientEvent::MatchmakingRequest.encode()?))
        .await?;
    println!("Sent matchmaking request");

    let mut turns_played = 0;

    while let Some(frame) = stream.next().await {
        let text = match frame? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let my_turn_state = match ServerEvent::decode(&text)? {
            ServerEvent::LobbyCreated(info) => {
                println!("Waiting for an opponent in {}", info.match_id);
                None
            }
            ServerEvent::LobbyReady(info) => {
                println!("Match {} ready, playing as {:?}", info.match_id, info.slot);
                if info.current_player_id.as_deref() == Some(args.player.as_str()) {
                    sink.send(Message::Text(ClientEvent::InitDataRequest.encode()?))
                        .await?;
                }
                None
            }
            ServerEvent::InitDataResponse(data) => {
                let mine = data.state.current_player_id.as_deref() == Some(args.player.as_str());
                mine.then_some(data.state)
            }
            ServerEvent::TurnChanged(change) => {
                println!(
                    "Turn {}: {} to act",
                    change.turn, change.current_player_id
                );
                (change.current_player_id == args.player).then_some(change.state)
            }
            ServerEvent::ActionResult(ack) => {
                println!("{} -> {}", ack.action, ack.message);
                None
            }
            ServerEvent::Error(payload) => {
                println!("Error {} ({}): {}", payload.code, payload.status, payload.reason);
                None
            }
            _ => None,
        };

        let Some(state) = my_turn_state else {
            continue;
        };
        if turns_played >= args.turns {
            break;
        }

        if let Some(target) = plan_move(&state, &args.player) {
            let request = ActionRequest {
                action_type: "Move".to_string(),
                target_position: Some(target),
                ..ActionRequest::default()
            };
            sink.send(Message::Text(ClientEvent::SubmitAction(request).encode()?))
                .await?;
        }
        sink.send(Message::Text(ClientEvent::EndTurn.encode()?))
            .await?;
        turns_played += 1;
    }

    sink.send(Message::Close(None)).await.ok();
    println!("Test client finished after {} turns", turns_played);
    Ok(())
}
