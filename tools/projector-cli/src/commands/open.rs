//! Open a virtual display and hold it.

use std::sync::Arc;
use std::time::Duration;

use projector_common::config::AppConfig;
use projector_platform_core::{ConsentGrant, DisplayConfig, DisplayFlags, Proxy};
use projector_session::{AuthorizationContext, CapabilityToken, VirtualDisplaySession};

pub struct OpenArgs {
    pub name: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub density: Option<u32>,
    pub flags: Option<String>,
    pub hold_secs: Option<u64>,
    pub revoke_after: Option<u64>,
    pub deny: bool,
}

pub async fn run(config: &AppConfig, args: OpenArgs) -> anyhow::Result<()> {
    let defaults = &config.display;
    let platform = Arc::new(super::platform(config)?);
    let features = platform.features();

    let flags = DisplayFlags::parse(args.flags.as_deref().unwrap_or(&defaults.flags))?;
    let display_config = DisplayConfig::builder(
        args.name.unwrap_or_else(|| defaults.name.clone()),
        args.width.unwrap_or(defaults.width),
        args.height.unwrap_or(defaults.height),
        args.density.unwrap_or(defaults.density),
    )?
    .with_flags(flags)
    .with_features(features)
    .build()?;

    if args.deny {
        platform.projection().deny_consent();
    }

    let package = config.platform.caller_package.clone();
    let manager = Proxy::resolve(platform.as_ref())?;
    let token = CapabilityToken::acquire(
        &manager,
        &AuthorizationContext::new(config.platform.uid, &package, ConsentGrant::granted(vec![1])),
    )?;
    println!("Capture authorized: {} ({})", token.id(), token.projection_id());

    let session = Arc::new(VirtualDisplaySession::resolve(platform.as_ref(), package)?);
    let display_id = {
        let session = Arc::clone(&session);
        let token = token.clone();
        tokio::task::spawn_blocking(move || session.open(&token, display_config)).await??
    };
    println!("Virtual display {display_id} is active");
    println!("{}", serde_json::to_string_pretty(&session.status())?);

    if let Some(secs) = args.revoke_after {
        let platform = Arc::clone(&platform);
        let projection = token.projection_id();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            tracing::info!(%projection, "Simulating user revocation");
            platform.revoke(projection);
        });
    }

    let hold = async {
        match args.hold_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    let ended = {
        let session = Arc::clone(&session);
        tokio::task::spawn_blocking(move || session.wait_released())
    };

    if args.hold_secs.is_none() {
        println!("Press Ctrl+C to release the display...");
    }
    tokio::select! {
        _ = tokio::signal::ctrl_c() => println!("Interrupted"),
        _ = hold => println!("Hold time elapsed"),
        _ = ended => println!("Session ended by the platform"),
    }

    let released = {
        let session = Arc::clone(&session);
        tokio::task::spawn_blocking(move || session.release()).await?
    };
    platform.flush();

    println!("{}", serde_json::to_string_pretty(&session.status())?);
    println!(
        "Display calls: create={} release={}; projection stops={}",
        platform.display().create_count(),
        platform.display().release_count(),
        platform.projection().stop_count()
    );

    released?;
    Ok(())
}
