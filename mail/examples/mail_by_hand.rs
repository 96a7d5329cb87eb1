//! Builds and encodes a simple multipart message by hand, with no router
//! or receiver in the loop.

use mail::{encode, MailResponse};

fn main() {
    let mut response = MailResponse::new("sender@example.test", "recipient@example.test", "Hello");
    response.set_body("This is the plain-text body.");
    response
        .attach("notes.txt", "text/plain", b"a few attached notes".to_vec())
        .expect("attaching a plain-text file never fails on content-type parsing");

    let bytes = encode::serialize(response.base()).expect("a freshly built response always encodes");
    print!("{}", String::from_utf8_lossy(&bytes));
}
