//! In-process notarization: a notary and a client share one room through
//! the memory hub, the notary marks up page 1 and both sides save what
//! they see.

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::info;
use notary_collab::{
    ApiCredentials, CredentialIssuer, LocalTokenIssuer, MemoryConnector, RoomManager,
    SessionConfig, SessionCoordinator, SessionError,
};
use notary_core::{Color, Point, Role};

const ROOM: &str = "demo-closing";
const WAIT: Duration = Duration::from_secs(10);

type DemoSession = SessionCoordinator<MemoryConnector>;

pub async fn run(out_dir: &Path, document: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    std::fs::create_dir_all(out_dir)?;

    let rooms = Arc::new(RoomManager::default());
    let issuer: Arc<dyn CredentialIssuer> = Arc::new(LocalTokenIssuer::new(Some(
        ApiCredentials::new("demo-key", "demo-secret"),
    )));
    let session = |identity: &str, role: Role| -> Result<DemoSession, SessionError> {
        let config = SessionConfig {
            document: document.clone(),
            ..SessionConfig::new(identity, role, ROOM)
        };
        let connector = MemoryConnector::new(rooms.clone(), issuer.clone());
        SessionCoordinator::new(config, connector, issuer.clone())
    };

    let mut notary = session("notary", Role::Notary)?;
    let mut client = session("client", Role::Client)?;

    notary.start().await?;
    client.start().await?;
    wait_for(&mut notary, |s| s.roster().remote_present()).await?;
    info!("notary: {}", notary.status());
    info!("client: {}", client.status());

    // signature box, a signature and a caption
    let (x, y, w, h) = (60.0, 620.0, 260.0, 70.0);
    let blue = Color::rgb(0x1f, 0x4e, 0xa8);
    notary.draw(
        1,
        [
            Point::new(x, y),
            Point::new(x + w, y),
            Point::new(x + w, y + h),
            Point::new(x, y + h),
            Point::new(x, y),
        ],
        blue,
        2.0,
    )?;
    notary.draw(1, signature(x + 20.0, y + 45.0), Color::BLACK, 2.5)?;
    notary.add_text(1, x, y - 10.0, "Sign here", 14.0, blue)?;

    let expected = notary.journal().len();
    wait_for(&mut client, |s| s.journal().len() == expected).await?;

    if let Err(e) = client.clear_page(1) {
        info!("client: {}", e.user_message());
    }

    let notary_png = out_dir.join("notary-page1.png");
    let client_png = out_dir.join("client-page1.png");
    notary.render_current()?.save_png(&notary_png)?;
    client.render_current()?.save_png(&client_png)?;

    let journal = out_dir.join("journal.jsonl");
    let lines = client.journal().to_json_lines()?;
    std::fs::write(&journal, &lines)?;

    let same = notary.frame() == client.frame();
    info!(
        "Pages match: {same}, sent {} op(s), received {}",
        notary.channel_stats().sent,
        client.channel_stats().received
    );
    print!("{lines}");
    println!(
        "wrote {}, {} and {}",
        notary_png.display(),
        client_png.display(),
        journal.display()
    );

    client.leave();
    notary.leave();
    Ok(())
}

/// A looping stroke that reads as a handwritten signature.
fn signature(x: f32, y: f32) -> Vec<Point> {
    (0..=80)
        .map(|i| {
            let t = i as f32 / 80.0;
            let sweep = t * 200.0;
            let loops = (t * std::f32::consts::TAU * 4.0).sin() * 14.0 * (1.0 - t * 0.5);
            Point::new(x + sweep + loops * 0.4, y - loops)
        })
        .collect()
}

async fn wait_for(
    session: &mut DemoSession,
    mut done: impl FnMut(&DemoSession) -> bool,
) -> Result<(), Box<dyn Error>> {
    tokio::time::timeout(WAIT, async {
        while !done(session) {
            match session.next_event().await {
                Some(event) => session.handle_event(event),
                None => break,
            }
        }
    })
    .await?;

    if done(session) {
        Ok(())
    } else {
        Err(format!("session ended early: {}", session.status()).into())
    }
}
