//! Holder authentication
//!
//! Credentials are collected from the holder through the terminal, mapped
//! from message fields to the names the authenticator expects, and checked
//! by the configured [`Authenticator`] instance.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::context::OperationContext;
use crate::error::{Error, ErrorKind, Result, ResultExt, ServiceError};
use crate::session::{Message, TokenSession};

/// Credential values keyed by the authenticator's credential names
pub type Credentials = BTreeMap<String, String>;

/// Attributes returned by a successful authentication
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthToken {
    attributes: BTreeMap<String, String>,
}

impl AuthToken {
    /// Token with the given attributes
    pub const fn new(attributes: BTreeMap<String, String>) -> Self {
        Self { attributes }
    }

    /// Attribute by name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Authenticated user id
    pub fn user_id(&self) -> Option<&str> {
        self.get("userid")
    }
}

/// A configured authentication instance
pub trait Authenticator: Send + Sync + fmt::Debug {
    /// Instance id
    fn id(&self) -> &str;

    /// Credential names `authenticate` needs
    fn required_credentials(&self) -> Vec<String>;

    /// Message field carrying `credential` in a plain or extended login
    fn credential_field(&self, credential: &str, extended: bool) -> Option<String>;

    /// Prompt title; empty when there is none for `locale`
    fn ui_title(&self, locale: &str) -> String;

    /// Prompt description; empty when there is none for `locale`
    fn ui_description(&self, locale: &str) -> String;

    /// Parameter descriptors for an extended login, keyed by parameter id
    fn ui_params(&self, locale: &str) -> BTreeMap<String, String>;

    /// Check the credentials
    fn authenticate(&self, credentials: &Credentials) -> std::result::Result<AuthToken, ServiceError>;
}

/// Named authenticator instances
#[derive(Debug, Clone, Default)]
pub struct AuthenticatorRegistry {
    instances: BTreeMap<String, Arc<dyn Authenticator>>,
}

impl AuthenticatorRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an authenticator under its id
    #[must_use]
    pub fn with(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.instances.insert(authenticator.id().to_owned(), authenticator);
        self
    }

    /// Authenticator by id
    pub fn get(&self, id: &str) -> Result<Arc<dyn Authenticator>> {
        self.instances
            .get(id)
            .cloned()
            .ok_or_else(|| Error::misconfiguration(format!("no authenticator named {id}")))
    }
}

/// Ask the holder for credentials
///
/// An extended login is used when the client sent `extendedLoginRequest`;
/// otherwise a plain user name and password login.
pub fn request_credentials(
    session: &mut dyn TokenSession,
    auth: &dyn Authenticator,
    ctx: &OperationContext,
) -> Result<Credentials> {
    let reply = if ctx.extension("extendedLoginRequest").is_some() {
        let locale = ctx.extension("locale").unwrap_or("en");
        let title = non_empty(auth.ui_title(locale), || auth.ui_title("en"));
        let description = non_empty(auth.ui_description(locale), || auth.ui_description("en"));
        debug!(authenticator = auth.id(), locale, "Requesting extended login");
        session.exchange(Message::ExtendedLoginRequest {
            title,
            description,
            params: auth.ui_params(locale),
        })
    } else {
        debug!(authenticator = auth.id(), "Requesting login");
        session.exchange(Message::LoginRequest)
    }
    .or_kind(ErrorKind::Login, "login request failed")?;

    match reply {
        Message::LoginResponse {
            screen_name,
            password,
        } => {
            let fields = BTreeMap::from([
                ("screen_name".to_owned(), screen_name),
                ("password".to_owned(), password),
            ]);
            map_credentials(&fields, auth, false)
        }
        Message::ExtendedLoginResponse(fields) => map_credentials(&fields, auth, true),
        other => Err(Error::login(format!("unexpected reply to login: {}", other.name()))),
    }
}

/// Map login message fields to the authenticator's credential names
pub fn map_credentials(
    fields: &BTreeMap<String, String>,
    auth: &dyn Authenticator,
    extended: bool,
) -> Result<Credentials> {
    auth.required_credentials()
        .into_iter()
        .map(|cred| {
            let field = auth
                .credential_field(&cred, extended)
                .ok_or_else(|| Error::login(format!("no message field mapped to {cred}")))?;
            let value = fields
                .get(&field)
                .cloned()
                .ok_or_else(|| Error::login(format!("login reply has no field {field}")))?;
            Ok((cred, value))
        })
        .collect()
}

fn non_empty(value: String, fallback: impl FnOnce() -> String) -> String {
    if value.is_empty() { fallback() } else { value }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Extensions, Operation};
    use crate::session::SessionError;

    #[derive(Debug)]
    struct Ldap;

    impl Authenticator for Ldap {
        fn id(&self) -> &str {
            "ldap1"
        }

        fn required_credentials(&self) -> Vec<String> {
            vec!["uid".into(), "pwd".into()]
        }

        fn credential_field(&self, credential: &str, extended: bool) -> Option<String> {
            let field = match (credential, extended) {
                ("uid", false) => "screen_name",
                ("pwd", false) => "password",
                ("uid", true) => "UID",
                ("pwd", true) => "PASSWORD",
                _ => return None,
            };
            Some(field.into())
        }

        fn ui_title(&self, locale: &str) -> String {
            if locale == "en" { "LDAP Login".into() } else { String::new() }
        }

        fn ui_description(&self, _locale: &str) -> String {
            "Directory credentials".into()
        }

        fn ui_params(&self, _locale: &str) -> BTreeMap<String, String> {
            BTreeMap::from([("UID".into(), "id=UID&name=User ID".into())])
        }

        fn authenticate(&self, credentials: &Credentials) -> std::result::Result<AuthToken, ServiceError> {
            Ok(AuthToken::new(BTreeMap::from([(
                "userid".into(),
                credentials["uid"].clone(),
            )])))
        }
    }

    #[derive(Debug)]
    struct Prompted {
        reply: Message,
        sent: Vec<Message>,
    }

    impl TokenSession for Prompted {
        fn write(&mut self, message: Message) -> std::result::Result<(), SessionError> {
            self.sent.push(message);
            Ok(())
        }

        fn read(&mut self) -> std::result::Result<Message, SessionError> {
            Ok(self.reply.clone())
        }

        fn client_address(&self) -> String {
            "127.0.0.1".into()
        }
    }

    fn ctx(extensions: Extensions) -> OperationContext {
        OperationContext::new(Operation::Format, extensions, "127.0.0.1".into())
    }

    #[test]
    fn test_plain_login() {
        let mut session = Prompted {
            reply: Message::LoginResponse {
                screen_name: "alice".into(),
                password: "pw".into(),
            },
            sent: vec![],
        };
        let creds = request_credentials(&mut session, &Ldap, &ctx(Extensions::new())).unwrap();
        assert_eq!(creds["uid"], "alice");
        assert_eq!(creds["pwd"], "pw");
        assert_eq!(session.sent, vec![Message::LoginRequest]);
        assert_eq!(Ldap.authenticate(&creds).unwrap().user_id(), Some("alice"));
    }

    #[test]
    fn test_extended_login_falls_back_to_english() {
        let mut session = Prompted {
            reply: Message::ExtendedLoginResponse(BTreeMap::from([
                ("UID".into(), "bob".into()),
                ("PASSWORD".into(), "pw".into()),
            ])),
            sent: vec![],
        };
        let extensions = Extensions::from([
            ("extendedLoginRequest".into(), "true".into()),
            ("locale".into(), "fr".into()),
        ]);
        let creds = request_credentials(&mut session, &Ldap, &ctx(extensions)).unwrap();
        assert_eq!(creds["uid"], "bob");
        assert!(matches!(
            &session.sent[0],
            Message::ExtendedLoginRequest { title, .. } if title == "LDAP Login"
        ));
    }

    #[test]
    fn test_missing_field_is_login_error() {
        let fields = BTreeMap::from([("screen_name".to_owned(), "alice".to_owned())]);
        let err = map_credentials(&fields, &Ldap, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Login);
    }
}
