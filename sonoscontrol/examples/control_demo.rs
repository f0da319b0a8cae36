// examples/control_demo.rs
//
// End-to-end demo against a real zone player:
//  - connect to a speaker by IP
//  - dump zone group topology
//  - dump transport state, current track, volume and mute
//  - optionally resolve a streaming-service share link and start playback
//
// Build and run (from sonoscontrol crate root):
//   cargo run --example control_demo -- <host> [link]
//
//   host: IP address of any speaker in the household
//   link: optional share link (Spotify/Tidal/Deezer/Apple Music/TuneIn)

use std::env;

use anyhow::{Result, bail};
use sonoscontrol::{DEFAULT_CONTROL_PORT, SonosClient, resolve_service_uri};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sonoscontrol=debug".into()),
        )
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(host) = args.first() else {
        bail!("usage: control_demo <host> [share-link]");
    };

    let mut client = SonosClient::new()?;
    client.connect(host.clone(), DEFAULT_CONTROL_PORT, None);

    // 1. Topology
    println!("Zone groups:");
    for group in client.available_groups().await? {
        println!("  {} (coordinator {})", group.name, group.coordinator);
        for member in &group.members {
            println!(
                "    {} {} {}",
                member.host,
                member.uuid,
                member.zone_name.as_deref().unwrap_or("<unnamed>")
            );
        }
    }

    // 2. Transport + current track
    let transport = client.get_transport_info().await?;
    println!(
        "\nTransport: {} ({})",
        transport.current_transport_state, transport.current_transport_status
    );

    let track = client.get_track_info().await?;
    println!("Title    : {}", track.metadata.title.as_deref().unwrap_or("<none>"));
    println!("Artist   : {}", track.metadata.artist.as_deref().unwrap_or("<none>"));
    if let Some(now_playing) = &track.metadata.stream_content {
        println!("Stream   : {now_playing}");
    }
    println!(
        "Position : {} / {}",
        track.elapsed.as_deref().unwrap_or("?"),
        track.duration.as_deref().unwrap_or("?")
    );
    if let Some(art) = &track.metadata.album_art_uri {
        println!("Art      : {art}");
    }

    // 3. Rendering state
    println!("\nVolume   : {}", client.get_volume().await?);
    println!("Muted    : {}", client.get_mute().await?);

    // 4. Optional: resolve a share link and play it
    if let Some(link) = args.get(1) {
        let reference = resolve_service_uri(link)?;
        println!("\nResolved link:");
        println!("  Kind     : {:?}", reference.kind);
        println!("  URI      : {}", reference.playable_uri());

        let metadata = reference.didl_metadata("control_demo");
        client
            .set_service_uri(&reference.playable_uri(), &metadata)
            .await?;
        client.play().await?;
        println!("Playback started.");
    }

    Ok(())
}
