//! Common test utilities: a simulated token behind a terminal session and
//! in-memory collaborators

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use hex_literal::hex;
use parking_lot::Mutex;
use tempfile::TempDir;
use tps_apdu_core::Buffer;
use tps_processor::{
    AuthToken, Authenticator, AuthenticatorRegistry, CertificateAuthority, Credentials,
    KeyDerivationClient, MemoryKeyStore, MemoryRegistry, Message, ProfileResolver,
    ResolverParams, ResolverRegistry, RevocationReason, RevocationResponse, ServiceError,
    SessionError, SessionKeyRequest, SessionKeyResponse, Services, Status, TokenSession,
    TpsConfig,
};

/// CUID of the simulated token
pub const CUID: &str = "0304050613140F101112";

/// Shared secret name and value used by every fixture
pub const SHARED_SECRET: &str = "sharedSecret";

/// Applet version reported once the simulated card installs an applet
pub const INSTALLED_APPLET: &str = "1.5.4a600000";

/// Token type returned by the static resolver
pub const TOKEN_TYPE: &str = "userKey";

/// Install a test subscriber once; repeated calls are ignored
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// What the simulated card holds and what it has seen
#[derive(Debug, Clone)]
pub struct CardState {
    /// CPLC data without the status word (45 bytes)
    pub cplc: Vec<u8>,
    /// Applet build id; `None` for an empty token
    pub build_id: Option<[u8; 4]>,
    /// Applet major and minor version from GET STATUS
    pub app_version: (u8, u8),
    /// Key version the card currently holds
    pub key_version: u8,
    /// Key version installed by PUT KEY
    pub next_key_version: u8,
    /// Override for the INITIALIZE UPDATE data length
    pub init_update_len: Option<usize>,
    /// Every APDU received, in order
    pub apdus: Vec<Vec<u8>>,
    /// Every non-APDU message received, in order
    pub prompts: Vec<Message>,
    /// Plain login answer
    pub login: (String, String),
}

impl Default for CardState {
    fn default() -> Self {
        Self {
            cplc: (0u8..45).collect(),
            build_id: Some(hex!("4A5F0102")),
            app_version: (1, 4),
            key_version: 0x01,
            next_key_version: 0x02,
            init_update_len: None,
            apdus: Vec::new(),
            prompts: Vec::new(),
            login: ("alice".into(), "secret".into()),
        }
    }
}

impl CardState {
    /// Instructions of the APDUs received, in order
    pub fn instructions(&self) -> Vec<u8> {
        self.apdus.iter().filter_map(|apdu| apdu.get(1).copied()).collect()
    }

    /// Number of APDUs with instruction `ins`
    pub fn count(&self, ins: u8) -> usize {
        self.instructions().into_iter().filter(|i| *i == ins).count()
    }

    fn answer_apdu(&mut self, apdu: &[u8]) -> Vec<u8> {
        self.apdus.push(apdu.to_vec());
        let (ins, p1) = (apdu.get(1).copied().unwrap_or(0), apdu.get(2).copied().unwrap_or(0));
        let ok = |mut data: Vec<u8>| {
            data.extend_from_slice(&[0x90, 0x00]);
            data
        };

        match ins {
            // GET DATA
            0xCA => ok(self.cplc.clone()),
            // GET STATUS
            0x3C => {
                let mut status = vec![0x01, 0x02, self.app_version.0, self.app_version.1];
                status.extend_from_slice(&[0x00, 0x00, 0x46, 0x50, 0x00, 0x00, 0x1F, 0x40]);
                status.resize(16, 0);
                ok(status)
            }
            // GET VERSION
            0x70 => match self.build_id {
                Some(build_id) => ok(build_id.to_vec()),
                None => vec![0x6D, 0x00],
            },
            // INITIALIZE UPDATE; version 0 means any key set
            0x50 => {
                if p1 != 0 && p1 != self.key_version {
                    return vec![0x6A, 0x88];
                }
                let mut data = vec![0x11; 10];
                data.extend_from_slice(&[self.key_version, 0x02]);
                data.extend_from_slice(&[0x22; 8]);
                data.extend_from_slice(&[0x33; 8]);
                data.resize(self.init_update_len.unwrap_or(28), 0x44);
                ok(data)
            }
            // PUT KEY
            0xD8 => {
                self.key_version = self.next_key_version;
                ok(Vec::new())
            }
            // INSTALL
            0xE6 => {
                if p1 & 0x04 != 0 {
                    self.build_id = Some(hex!("4A600000"));
                    self.app_version = (1, 5);
                }
                ok(Vec::new())
            }
            _ => ok(Vec::new()),
        }
    }

    fn answer(&mut self, message: Message) -> Option<Message> {
        match message {
            Message::TokenPduRequest(apdu) => Some(Message::TokenPduResponse(Bytes::from(
                self.answer_apdu(&apdu),
            ))),
            Message::LoginRequest => {
                self.prompts.push(message);
                Some(Message::LoginResponse {
                    screen_name: self.login.0.clone(),
                    password: self.login.1.clone(),
                })
            }
            Message::StatusUpdateRequest { .. } => {
                self.prompts.push(message);
                Some(Message::StatusUpdateResponse)
            }
            other => {
                self.prompts.push(other);
                None
            }
        }
    }
}

/// Terminal session whose far end is a simulated token
#[derive(Debug, Clone, Default)]
pub struct SimulatedCard {
    state: Arc<Mutex<CardState>>,
    pending: Arc<Mutex<Option<Message>>>,
}

impl SimulatedCard {
    /// Card starting from `state`
    pub fn new(state: CardState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            pending: Arc::default(),
        }
    }

    /// Snapshot of the card state
    pub fn state(&self) -> CardState {
        self.state.lock().clone()
    }
}

impl TokenSession for SimulatedCard {
    fn write(&mut self, message: Message) -> Result<(), SessionError> {
        *self.pending.lock() = self.state.lock().answer(message);
        Ok(())
    }

    fn read(&mut self) -> Result<Message, SessionError> {
        self.pending
            .lock()
            .take()
            .ok_or_else(|| SessionError::Closed("terminal hung up".into()))
    }

    fn client_address(&self) -> String {
        "10.0.0.7".into()
    }
}

/// Key service double; session keys are fixed 16-byte blobs
#[derive(Debug, Default)]
pub struct FakeTks {
    /// Key info of every session key request
    pub session_requests: Mutex<Vec<Buffer>>,
    /// `(new, current)` key info of every key set request
    pub key_set_requests: Mutex<Vec<(Buffer, Buffer)>>,
    /// Status returned for session keys
    pub session_status: i32,
}

impl KeyDerivationClient for FakeTks {
    fn compute_random_data(&self, size: usize, _connection_id: &str) -> Result<Status<Buffer>, ServiceError> {
        Ok(Status::ok(Buffer::from(vec![0x5A; size])))
    }

    fn compute_session_key(&self, request: &SessionKeyRequest<'_>) -> Result<SessionKeyResponse, ServiceError> {
        self.session_requests.lock().push(request.key_info.clone());
        Ok(SessionKeyResponse {
            status: self.session_status,
            session_key: Buffer::from([0x01u8; 16]),
            enc_session_key: Buffer::from([0x02u8; 16]),
            host_cryptogram: Buffer::from([0x03u8; 8]),
            ..Default::default()
        })
    }

    fn encrypt_data(
        &self,
        _cuid: &Buffer,
        _key_info: &Buffer,
        plaintext: &Buffer,
        _connection_id: &str,
    ) -> Result<Status<Buffer>, ServiceError> {
        Ok(Status::ok(Buffer::from(plaintext.iter().map(|b| b ^ 0xFF).collect::<Vec<_>>())))
    }

    fn create_key_set_data(
        &self,
        new_key_info: &Buffer,
        current_key_info: &Buffer,
        _diversification_data: &Buffer,
        _connection_id: &str,
    ) -> Result<Status<Buffer>, ServiceError> {
        self.key_set_requests
            .lock()
            .push((new_key_info.clone(), current_key_info.clone()));
        Ok(Status::ok(Buffer::from([0xAAu8; 24])))
    }
}

/// Certificate authority double recording decimal serials
#[derive(Debug, Default)]
pub struct FakeAuthority {
    /// Decimal serials revoked, in order
    pub revoked: Mutex<Vec<String>>,
    /// Decimal serial the authority refuses
    pub refuse: Option<String>,
}

impl CertificateAuthority for FakeAuthority {
    fn revoke_certificate(
        &self,
        _connection_id: &str,
        _check_presence: bool,
        serial: &str,
        _certificate: &Buffer,
        _reason: RevocationReason,
    ) -> Result<RevocationResponse, ServiceError> {
        if self.refuse.as_deref() == Some(serial) {
            return Err(ServiceError::new("CA unreachable"));
        }
        self.revoked.lock().push(serial.to_owned());
        Ok(RevocationResponse { status: 0 })
    }
}

/// Resolver that always answers with one token type
#[derive(Debug)]
pub struct StaticResolver(pub &'static str);

impl ProfileResolver for StaticResolver {
    fn token_type(&self, _params: &ResolverParams) -> tps_processor::Result<String> {
        Ok(self.0.to_owned())
    }
}

/// Directory authenticator accepting one password
#[derive(Debug)]
pub struct PasswordAuthenticator;

impl Authenticator for PasswordAuthenticator {
    fn id(&self) -> &str {
        "ldap1"
    }

    fn required_credentials(&self) -> Vec<String> {
        vec!["uid".into(), "pwd".into()]
    }

    fn credential_field(&self, credential: &str, _extended: bool) -> Option<String> {
        match credential {
            "uid" => Some("screen_name".into()),
            "pwd" => Some("password".into()),
            _ => None,
        }
    }

    fn ui_title(&self, _locale: &str) -> String {
        "Directory login".into()
    }

    fn ui_description(&self, _locale: &str) -> String {
        "Enter your directory credentials".into()
    }

    fn ui_params(&self, _locale: &str) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    fn authenticate(&self, credentials: &Credentials) -> Result<AuthToken, ServiceError> {
        match credentials.get("pwd").map(String::as_str) {
            Some("secret") => Ok(AuthToken::new(BTreeMap::from([(
                "userid".to_owned(),
                credentials.get("uid").cloned().unwrap_or_default(),
            )]))),
            _ => Err(ServiceError::new("invalid credentials")),
        }
    }
}

/// Temporary directory holding a `<required>.ijc` applet file; removed on drop
pub fn applet_dir(name: &str, required: &str) -> TempDir {
    let dir = tempfile::Builder::new()
        .prefix(&format!("tps-processor-{name}-"))
        .tempdir()
        .unwrap();
    std::fs::write(dir.path().join(format!("{required}.ijc")), vec![0xC4; 600]).unwrap();
    dir
}

/// Applet and key settings for `token_type`, without holder authentication
pub fn profile_config(dir: &Path, token_type: &str, required_applet: &str) -> TpsConfig {
    let p = format!("op.format.{token_type}");
    TpsConfig::from_pairs([
        ("op.format.tokenProfileResolver".to_owned(), "static".to_owned()),
        (format!("{p}.update.applet.requiredVersion"), required_applet.to_owned()),
        (format!("{p}.update.applet.directory"), dir.display().to_string()),
        (format!("{p}.update.symmetricKeys.requiredVersion"), "2".to_owned()),
        (format!("{p}.revokeCert"), "true".to_owned()),
    ])
}

/// Format configuration for [`TOKEN_TYPE`] with the applet in `dir`, authenticated against `ldap1`
pub fn format_config(dir: &Path, required_applet: &str) -> TpsConfig {
    let mut config = profile_config(dir, TOKEN_TYPE, required_applet);
    config.set(&format!("op.format.{TOKEN_TYPE}.auth.id"), "ldap1");
    config.set("auths.instance.ldap1.authCredName", "uid");
    config
}

/// Collaborators around `config`
pub fn services(
    config: TpsConfig,
    tks: Arc<FakeTks>,
    registry: Arc<MemoryRegistry>,
    authority: Arc<FakeAuthority>,
) -> Services {
    Services {
        config: Arc::new(config),
        tks,
        keys: Arc::new(MemoryKeyStore::new().with_key(SHARED_SECRET, [0x40u8; 16])),
        authority,
        registry,
        resolvers: ResolverRegistry::new().with("static", Arc::new(StaticResolver(TOKEN_TYPE))),
        authenticators: AuthenticatorRegistry::new().with(Arc::new(PasswordAuthenticator)),
    }
}
