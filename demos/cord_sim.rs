use std::time::Duration;

use tokio::time::sleep;
use virtual_cord::{util, Config, CordPosition, Node, NodeHandle, NodeId, RadioMedium};

async fn print_state(node: &NodeHandle) -> virtual_cord::Result<()> {
    let info = node.state_info().await?;
    println!(
        "{}  {:<11} position {:<10} successor {:?} predecessor {:?} neighbors {}",
        node.id(),
        info.state_type,
        info.position.to_string(),
        info.successor.map(|(_, p)| p.value()),
        info.predecessor.map(|(_, p)| p.value()),
        info.neighbor_count,
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    util::init_tracing()?;

    let config = Config {
        tick_interval: Duration::from_millis(200),
        hello_period: Duration::from_millis(200),
        sending_delay: Duration::from_millis(10),
        ..Config::default()
    };
    let settle = config.tick_interval * (config.discovery_cycles + 3);

    // Three stations in a line: a <-> b <-> c
    let medium = RadioMedium::with_loss(0.05, 42);
    let ids: Vec<NodeId> = (1..=3u8).map(|n| NodeId([0x02, 0, 0, 0, 0, n])).collect();
    medium.link(ids[0], ids[1])?;
    medium.link(ids[1], ids[2])?;

    println!("Starting {} nodes, one at a time", ids.len());
    let mut nodes = Vec::new();
    for id in &ids {
        nodes.push(Node::spawn(*id, config.clone(), medium.transport(*id))?);
        sleep(settle).await;
    }

    println!("\nCord after joining:");
    for node in &nodes {
        print_state(node).await?;
    }

    let target = CordPosition::START;
    println!("\nSending data from {} to position {}", nodes[2].id(), target);
    if let Err(e) = nodes[2].send_data(target, &b"hello cord"[..]).await {
        println!("send failed: {}", e);
    }
    sleep(settle).await;

    for node in nodes.iter_mut() {
        while let Some(delivery) = node.try_recv_data() {
            println!(
                "{} received {:?} from {}",
                node.id(),
                String::from_utf8_lossy(&delivery.payload),
                delivery.source
            );
        }
    }

    for node in nodes {
        node.shutdown().await?;
    }
    Ok(())
}
