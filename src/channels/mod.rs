pub mod instagram;
pub mod whatsapp;

/// Meta webhook verification handshake, shared by both channels.
pub fn verify_subscription<'a>(
    expected_token: &str,
    mode: Option<&str>,
    token: Option<&str>,
    challenge: Option<&'a str>,
) -> Option<&'a str> {
    if mode == Some("subscribe") && token == Some(expected_token) {
        challenge
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_echoes_challenge_on_match() {
        assert_eq!(
            verify_subscription("secret", Some("subscribe"), Some("secret"), Some("1234")),
            Some("1234")
        );
    }

    #[test]
    fn handshake_rejects_wrong_token_or_mode() {
        assert_eq!(
            verify_subscription("secret", Some("subscribe"), Some("wrong"), Some("1234")),
            None
        );
        assert_eq!(
            verify_subscription("secret", Some("unsubscribe"), Some("secret"), Some("1234")),
            None
        );
    }
}
