use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{error, info};
use tokio_util::sync::CancellationToken;

use kano_wand::ble::{spawn_notification_router, BleDiscovery};
use kano_wand::{
    init_logging, Color, ConnectionState, EventClass, Pattern, Selector, SensorEvent, Shop,
};

/// Scan for Kano wands, connect, and stream sensor notifications.
#[derive(Parser, Debug)]
#[command(name = "wand-scan")]
struct Args {
    /// Exact advertised name to match
    #[arg(long)]
    name: Option<String>,

    /// Advertised-name prefix to match (default: "Kano-Wand" when no
    /// other selector flag is given)
    #[arg(long)]
    prefix: Option<String>,

    /// Hardware address to match
    #[arg(long)]
    mac: Option<String>,

    /// Scan duration in seconds
    #[arg(long, default_value_t = 5)]
    timeout: u64,

    /// How long to stream notifications before disconnecting, in seconds
    #[arg(long, default_value_t = 20)]
    listen: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let args = Args::parse();

    let mut selector = Selector {
        name: args.name,
        prefix: args.prefix,
        mac: args.mac,
    };
    if selector.is_empty() {
        selector.prefix = Some("Kano-Wand".to_string());
    }

    let shop = Shop::new(BleDiscovery::new().await?);
    let sessions = shop
        .scan(&selector, Duration::from_secs(args.timeout), true)
        .await?;

    if sessions.is_empty() {
        error!("No wands found");
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let mut routers = Vec::new();

    for session in &sessions {
        // Auto-connect failures were already logged by the scan.
        if session.state() != ConnectionState::Connected {
            continue;
        }

        info!(
            "{}: organization {:?}, software {:?}, battery {:?}%",
            session.identity(),
            session.get_organization().await?,
            session.get_software_version().await?,
            session.get_battery().await?,
        );

        session.set_led("#2185D0".parse::<Color>()?, true).await?;
        session.vibrate(Pattern::Short).await?;

        routers.push(spawn_notification_router(Arc::clone(session), cancel.clone()));

        session
            .on(EventClass::Button, |event| {
                if let SensorEvent::Button(pressed) = event {
                    info!("Button: {}", pressed);
                }
            })
            .await?;
        session
            .on(EventClass::Position, |event| {
                if let SensorEvent::Position(sample) = event {
                    info!(
                        "Position: x={} y={} z={} w={}",
                        sample.x, sample.y, sample.z, sample.w
                    );
                }
            })
            .await?;
    }

    tokio::time::sleep(Duration::from_secs(args.listen)).await;

    cancel.cancel();
    for router in routers {
        if let Err(err) = router.await.expect("Notification router panicked") {
            error!("Notification router failed: {}", err);
        }
    }
    for session in &sessions {
        session.disconnect().await?;
    }

    Ok(())
}
