use std::sync::Arc;
use std::time::Duration;

use nan_aware::core::Config;
use nan_aware::network::{Delivery, NanNode, UdpMedium};
use nan_aware::util::init_logging;
use tokio::sync::mpsc;
use tokio::time::sleep;

fn print_delivery(node: &str, delivery: &Delivery) {
    let text = String::from_utf8_lossy(&delivery.payload);
    println!("{} <- {}: {:?}", node, delivery.from, text);
}

#[tokio::main]
async fn main() -> nan_aware::Result<()> {
    init_logging(tracing::Level::INFO);

    let localhost = "127.0.0.1:0".parse().unwrap();
    let medium_a = Arc::new(UdpMedium::bind(localhost)?);
    let medium_b = Arc::new(UdpMedium::bind(localhost)?);
    medium_a.add_neighbour(medium_b.local_addr()?);
    medium_b.add_neighbour(medium_a.local_addr()?);

    // Shorter startup and stats periods than a real radio would use.
    let config = Config {
        startup_delay: Duration::from_millis(200),
        stats_interval: Duration::from_secs(2),
        ..Default::default()
    };

    let (sink_a, mut inbox_a) = mpsc::unbounded_channel::<Delivery>();
    let (sink_b, mut inbox_b) = mpsc::unbounded_channel::<Delivery>();
    let node_a = NanNode::new(config.clone(), medium_a.clone(), Arc::new(sink_a))?;
    let node_b = NanNode::new(config, medium_b.clone(), Arc::new(sink_b))?;
    medium_a.spawn_receiver(node_a.frame_sender())?;
    medium_b.spawn_receiver(node_b.frame_sender())?;

    let (handle_a, handle_b) = (node_a.handle(), node_b.handle());
    let mac_b = node_b.mac();
    println!("Node A: {}", node_a.mac());
    println!("Node B: {}", mac_b);

    let task_a = tokio::spawn(node_a.run());
    let task_b = tokio::spawn(node_b.run());

    handle_a.queue_message(mac_b, &b"hello from a"[..]).await?;

    let deadline = sleep(Duration::from_secs(5));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            Some(d) = inbox_a.recv() => print_delivery("A", &d),
            Some(d) = inbox_b.recv() => print_delivery("B", &d),
            _ = &mut deadline => break,
        }
    }

    for summary in handle_a.peers().await? {
        println!(
            "A knows {} (sync beacons {}, out {})",
            summary.mac, summary.sync_beacons, summary.messages_out
        );
    }

    handle_a.stop().await?;
    handle_b.stop().await?;
    task_a.await.map_err(|e| nan_aware::Error::invalid_state(e.to_string()))??;
    task_b.await.map_err(|e| nan_aware::Error::invalid_state(e.to_string()))??;
    Ok(())
}
