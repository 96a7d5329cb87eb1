//! A minimal subscribe/confirm/posting state machine registered on a
//! `Router`, delivering two messages through it by hand.

use std::sync::Arc;

use mail::{HandlerId, MailRequest, Route, Router, Transition};

fn main() {
    let router = Router::new();

    router
        .register(
            Route::new("users", "START", "users-(action)@(host)").capture("action", "[a-z]+").capture("host", ".+"),
            Arc::new(|_msg, _caps| Ok(Transition::GoTo(HandlerId::new("users", "CONFIRM")))),
        )
        .expect("the START pattern compiles");

    router
        .register(
            Route::new("users", "CONFIRM", "users-(action)@(host)").capture("action", "[a-z]+").capture("host", ".+"),
            Arc::new(|_msg, captures| {
                if captures.get("action").map(String::as_str) == Some("confirm") {
                    Ok(Transition::GoTo(HandlerId::new("users", "POSTING")))
                } else {
                    Ok(Transition::Stay)
                }
            }),
        )
        .expect("the CONFIRM pattern compiles");

    let subscribe = MailRequest::new(None, "zed@localhost".to_owned(), vec!["users-subscribe@localhost".to_owned()], b"Subject: subscribe\r\n\r\n".to_vec()).unwrap();
    for result in router.deliver(&subscribe) {
        result.unwrap();
    }
    println!("state after subscribe: {}", router.get_state("users", &subscribe).unwrap());

    let confirm = MailRequest::new(None, "zed@localhost".to_owned(), vec!["users-confirm@localhost".to_owned()], b"Subject: confirm\r\n\r\n".to_vec()).unwrap();
    for result in router.deliver(&confirm) {
        result.unwrap();
    }
    println!("state after confirm: {}", router.get_state("users", &confirm).unwrap());
}
