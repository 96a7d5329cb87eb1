//! Relays a simple message to a configured host. Requires the `transport`
//! feature: `cargo run --example send_mail --features transport`.

use mail::{MailResponse, Relay, RelayConfig};

#[tokio::main]
async fn main() {
    let mut message = MailResponse::new("sender@example.test", "recipient@example.test", "Hello from the relay example");
    message.set_body("This message was relayed by the send_mail example.");

    let relay = Relay::new(RelayConfig::default()).expect("default relay config has no conflicting options");

    match relay.deliver(&message, None, None).await {
        Ok(()) => println!("delivered"),
        Err(e) => eprintln!("delivery failed: {e}"),
    }
}
