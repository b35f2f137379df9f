//! `notary session`: join a relay and drive the session from stdin.

use std::error::Error;
use std::sync::Arc;

use log::{error, info};
use notary_collab::{
    CredentialIssuer, LocalTokenIssuer, SessionConfig, SessionCoordinator, SessionError,
    WsConnector,
};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::command::{Command, HELP};

type Session = SessionCoordinator<WsConnector>;

#[derive(Debug, PartialEq)]
enum Flow {
    Continue,
    Quit,
}

pub async fn run(config: SessionConfig) -> Result<(), Box<dyn Error>> {
    let issuer: Arc<dyn CredentialIssuer> =
        Arc::new(LocalTokenIssuer::new(config.credentials.clone()));
    let connector = WsConnector::from_config(&config);
    let mut session = SessionCoordinator::new(config, connector, issuer)?;

    join(&mut session).await;
    println!("type 'help' for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<Command>() {
                    Ok(command) => {
                        if execute(&mut session, command).await == Flow::Quit {
                            break;
                        }
                    }
                    Err(e) => println!("{e}"),
                }
            }
            Some(event) = session.next_event() => {
                let before = session.status().to_string();
                session.handle_event(event);
                if session.status() != before {
                    println!("{}", session.status());
                }
            }
        }
    }

    session.leave();
    Ok(())
}

async fn join(session: &mut Session) {
    match session.start().await {
        Ok(()) => println!("{}", session.status()),
        Err(e) => println!("{}", e.user_message()),
    }
    for notice in session.notices() {
        println!("{notice}");
    }
}

async fn execute(session: &mut Session, command: Command) -> Flow {
    let result = match command {
        Command::Draw {
            page,
            path,
            color,
            width,
        } => session.draw(page, path, color, width),
        Command::Text {
            page,
            x,
            y,
            size,
            color,
            value,
        } => session.add_text(page, x, y, value, size, color),
        Command::Clear(page) => {
            let page = page.unwrap_or(session.current_page());
            session.clear_page(page)
        }
        Command::Page(page) => session.set_page(page).map(|shown| {
            println!("page {shown} of {}", session.page_count());
        }),
        Command::Render(path) => render(session, &path),
        Command::Export(path) => {
            export(session, &path);
            Ok(())
        }
        Command::Status => {
            print_status(session);
            Ok(())
        }
        Command::Start => {
            join(session).await;
            Ok(())
        }
        Command::Leave => {
            session.leave();
            println!("{}", session.status());
            Ok(())
        }
        Command::Help => {
            println!("{HELP}");
            Ok(())
        }
        Command::Quit => return Flow::Quit,
    };

    if let Err(e) = result {
        println!("{}", e.user_message());
    }
    Flow::Continue
}

fn render(session: &mut Session, path: &std::path::Path) -> Result<(), SessionError> {
    let frame = session.render_current()?;
    match frame.save_png(path) {
        Ok(()) => println!("saved page {} to {}", frame.page(), path.display()),
        Err(e) => error!("Failed to save {}: {e}", path.display()),
    }
    Ok(())
}

fn export(session: &Session, path: &std::path::Path) {
    let written = session
        .journal()
        .to_json_lines()
        .map_err(|e| e.to_string())
        .and_then(|lines| std::fs::write(path, lines).map_err(|e| e.to_string()));
    match written {
        Ok(()) => {
            info!("Exported {} operation(s)", session.journal().len());
            println!("wrote {}", path.display());
        }
        Err(e) => error!("Failed to export journal to {}: {e}", path.display()),
    }
}

fn print_status(session: &Session) {
    println!("{} ({})", session.status(), session.state());
    println!(
        "document {} page {} of {}",
        session.document_name(),
        session.current_page(),
        session.page_count()
    );
    for participant in session.participants() {
        println!(
            "  {:<8} {:<12} {}",
            participant.role.as_str(),
            participant.identity,
            if participant.is_connected { "connected" } else { "away" }
        );
    }
    let stats = session.channel_stats();
    println!(
        "ops {} journal {} sent {} received {} dropped {}",
        session.canvas().operation_count(),
        session.journal().len(),
        stats.sent,
        stats.received,
        stats.dropped
    );
}
