//! Two stations on a software radio medium: one sends a few datagrams, the
//! other echoes every datagram back to its sender.

use core::time::Duration;

use espnow_net::{
    Endpoint, PeerAddr, PeerOptions, Result,
    sim::{Medium, SimRadio},
};

const PINGER: PeerAddr = PeerAddr([0x24, 0x0a, 0xc4, 0, 0, 1]);
const ECHOER: PeerAddr = PeerAddr([0x24, 0x0a, 0xc4, 0, 0, 2]);

fn echo(radio: SimRadio) -> Result<()> {
    let mut endpoint = Endpoint::new(radio);
    endpoint.activate(true)?;

    // stop once the pinger has been quiet for a while
    while let Some(packet) = endpoint.receive(Some(Duration::from_secs(1)))? {
        if endpoint.get_peer(packet.peer).is_err() {
            endpoint.add_peer(packet.peer, PeerOptions::default())?;
        }

        endpoint.send(Some(&packet.peer), &packet.msg, false)?;
    }

    println!("echoer: {:?}", endpoint.stats());
    Ok(())
}

fn main() -> Result<()> {
    let medium = Medium::new();

    let echoer = {
        let radio = medium.radio(ECHOER);
        std::thread::spawn(move || echo(radio))
    };

    let mut endpoint = Endpoint::new(medium.radio(PINGER));
    endpoint.activate(true)?;
    endpoint.add_peer(ECHOER, PeerOptions::default())?;

    // give the echoer a chance to come up
    std::thread::sleep(Duration::from_millis(100));

    for i in 0..5u8 {
        let msg = [b'p', b'i', b'n', b'g', b'0' + i];

        let acked = endpoint.send(Some(&ECHOER), &msg, true)?;

        match endpoint.receive(Some(Duration::from_millis(500)))? {
            Some(packet) => println!(
                "pinger: {} echoed {:?} (acked: {acked})",
                packet.peer,
                String::from_utf8_lossy(&packet.msg),
            ),
            None => println!("pinger: no echo (acked: {acked})"),
        }
    }

    println!("pinger: {:?}", endpoint.stats());

    if let Ok(result) = echoer.join() {
        result?;
    }

    Ok(())
}
