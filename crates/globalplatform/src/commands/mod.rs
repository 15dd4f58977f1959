//! Command definitions for the card manager and the token applet
//!
//! Each command wraps a generic [`tps_apdu_core::Command`]: constructors fix
//! the header bytes, and the [`tps_apdu_core::ApduCommand`] implementation
//! parses the response into the command's success type.

/// Newtype over [`tps_apdu_core::Command`] whose response is decoded by `parse`
macro_rules! apdu_command {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
        success = $success:ty;
        parse = |$response:ident| $parse:block
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name(tps_apdu_core::Command);

        impl tps_apdu_core::ApduCommand for $name {
            type Success = $success;
            type Error = crate::Error;

            fn command(&self) -> &tps_apdu_core::Command {
                &self.0
            }

            fn parse_response($response: tps_apdu_core::Response) -> crate::Result<$success> {
                $parse
            }
        }
    };
}

pub mod delete;
pub mod external_authenticate;
pub mod get_data;
pub mod get_status;
pub mod get_version;
pub mod initialize_update;
pub mod install;
pub mod list_objects;
pub mod load;
pub mod put_key;
pub mod select;
pub mod set_issuer_info;

pub use delete::{DeleteCommand, DeleteOutcome};
pub use external_authenticate::ExternalAuthenticateCommand;
pub use get_data::GetDataCommand;
pub use get_status::GetStatusCommand;
pub use get_version::GetVersionCommand;
pub use initialize_update::{InitializeUpdateCommand, InitializeUpdateData};
pub use install::InstallCommand;
pub use list_objects::ListObjectsCommand;
pub use load::LoadCommand;
pub use put_key::PutKeyCommand;
pub use select::SelectCommand;
pub use set_issuer_info::SetIssuerInfoCommand;

/// Fail with the card's status word unless the response is 90 00
pub(crate) fn require_success(response: &tps_apdu_core::Response) -> crate::Result<()> {
    match response.status() {
        sw if sw.is_success() => Ok(()),
        sw => Err(crate::Error::CardStatus(sw)),
    }
}
