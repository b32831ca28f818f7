use std::{
    fmt::{self, Debug, Formatter},
    str::FromStr,
};

use derive_getters::Getters;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("no host given, expected user[:password]@host[:port]")]
    MissingHost,
    #[error("no user given, expected user[:password]@host[:port]")]
    MissingUser,
    #[error("{0:?} is not a valid port")]
    InvalidPort(String),
}

/// Where and as whom to log in, parsed from `user[:password]@host[:port]`.
#[derive(Clone, PartialEq, Eq, Getters)]
pub struct ConnectionDescriptor {
    user: String,
    password: Option<String>,
    host: String,
    /// 0 when no port was given.
    port: u16,
}

impl FromStr for ConnectionDescriptor {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // User names are often mail addresses, so the host follows the last @.
        let (credentials, address) = s.rsplit_once('@').ok_or(DescriptorError::MissingHost)?;
        let (host, port) = match address.rsplit_once(':') {
            Some((host, port)) => (
                host,
                port.parse()
                    .map_err(|_| DescriptorError::InvalidPort(port.to_string()))?,
            ),
            None => (address, 0),
        };
        if host.is_empty() {
            return Err(DescriptorError::MissingHost);
        }

        let (user, password) = match credentials.split_once(':') {
            Some((user, password)) => (user, Some(password.to_string())),
            None => (credentials, None),
        };
        if user.is_empty() {
            return Err(DescriptorError::MissingUser);
        }

        Ok(Self {
            user: user.to_string(),
            password,
            host: host.to_string(),
            port,
        })
    }
}

impl Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<password>"))
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use assertables::*;
    use rstest::*;

    use super::*;

    #[rstest]
    #[case("joe@mail.example.org", "joe", None, "mail.example.org", 0)]
    #[case("joe:secret@mail.example.org:1993", "joe", Some("secret"), "mail.example.org", 1993)]
    #[case(
        "joe@example.org:pa:ss@word@imap.example.org",
        "joe@example.org",
        Some("pa:ss@word"),
        "imap.example.org",
        0
    )]
    fn test_parse(
        #[case] input: &str,
        #[case] user: &str,
        #[case] password: Option<&str>,
        #[case] host: &str,
        #[case] port: u16,
    ) {
        let descriptor: ConnectionDescriptor = assert_ok!(input.parse());

        assert_eq!(descriptor.user(), user);
        assert_eq!(descriptor.password().as_deref(), password);
        assert_eq!(descriptor.host(), host);
        assert_eq!(descriptor.port(), port);
    }

    #[rstest]
    #[case("mail.example.org", DescriptorError::MissingHost)]
    #[case("joe@", DescriptorError::MissingHost)]
    #[case("@mail.example.org", DescriptorError::MissingUser)]
    #[case(":secret@mail.example.org", DescriptorError::MissingUser)]
    #[case("joe@mail.example.org:imap", DescriptorError::InvalidPort("imap".to_string()))]
    #[case("joe@mail.example.org:70000", DescriptorError::InvalidPort("70000".to_string()))]
    fn test_malformed(#[case] input: &str, #[case] expected: DescriptorError) {
        assert_eq!(input.parse::<ConnectionDescriptor>(), Err(expected));
    }

    #[rstest]
    fn test_debug_hides_password() {
        let descriptor: ConnectionDescriptor = assert_ok!("joe:secret@example.org".parse());

        assert_not_contains!(format!("{descriptor:?}"), "secret");
    }
}
