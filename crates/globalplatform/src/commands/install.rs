//! INSTALL [for load] and INSTALL [for install and make selectable]

use bytes::{BufMut, BytesMut};
use tps_apdu_core::Command;

use super::require_success;
use crate::constants::{cla, ins, param, tags};

apdu_command! {
    /// INSTALL: `84 E6 p1 00 Lc data`
    pub struct InstallCommand;
    success = ();
    parse = |response| { require_success(&response) }
}

fn put_lv(buf: &mut BytesMut, value: &[u8]) {
    buf.put_u8(value.len() as u8);
    buf.put_slice(value);
}

impl InstallCommand {
    /// Prepare the card to receive a package of `code_length` bytes
    ///
    /// Load parameters carry the non-volatile code limit: `EF 04 C6 02 len`.
    pub fn for_load(package_aid: &[u8], security_domain_aid: &[u8], code_length: u16) -> Self {
        let mut data = BytesMut::new();
        put_lv(&mut data, package_aid);
        put_lv(&mut data, security_domain_aid);
        // load file data block hash
        data.put_u8(0x00);

        let mut params = BytesMut::with_capacity(6);
        params.put_u8(tags::LOAD_PARAMETERS);
        params.put_u8(0x04);
        params.put_u8(tags::NON_VOLATILE_CODE_LIMIT);
        params.put_u8(0x02);
        params.put_u16(code_length);
        put_lv(&mut data, &params);

        // load token
        data.put_u8(0x00);

        Self(Command::new_with_data(cla::GP, ins::INSTALL, param::INSTALL_FOR_LOAD, 0x00, data.freeze()))
    }

    /// Instantiate an applet from a loaded package and make it selectable
    ///
    /// The instance AID equals the applet AID. Install parameters carry the
    /// instance size and the applet's memory size under tag `C9`.
    pub fn for_install_and_make_selectable(
        package_aid: &[u8],
        applet_aid: &[u8],
        privileges: u8,
        instance_size: u16,
        memory_size: u16,
    ) -> Self {
        let mut data = BytesMut::new();
        put_lv(&mut data, package_aid);
        put_lv(&mut data, applet_aid);
        put_lv(&mut data, applet_aid);
        put_lv(&mut data, &[privileges]);

        let mut params = BytesMut::with_capacity(6);
        params.put_u8(tags::INSTALL_PARAMETERS);
        params.put_u8(0x04);
        params.put_u16(instance_size);
        params.put_u16(memory_size);
        put_lv(&mut data, &params);

        // install token
        data.put_u8(0x00);

        Self(Command::new_with_data(
            cla::GP,
            ins::INSTALL,
            param::INSTALL_AND_MAKE_SELECTABLE,
            0x00,
            data.freeze(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use tps_apdu_core::ApduCommand;

    #[test]
    fn test_install_for_load() {
        let cmd = InstallCommand::for_load(&hex!("627601FF0000"), &hex!("A0000000030000"), 0x1234);
        assert_eq!(
            cmd.to_bytes().as_ref(),
            hex!("80E6020018 06627601FF0000 07A0000000030000 00 06EF04C6021234 00")
        );
    }

    #[test]
    fn test_install_applet() {
        let cmd = InstallCommand::for_install_and_make_selectable(
            &hex!("627601FF0000"),
            &hex!("627601FF000000"),
            0x00,
            18000,
            5000,
        );
        assert_eq!(
            cmd.to_bytes().as_ref(),
            hex!("80E60C0021 06627601FF0000 07627601FF000000 07627601FF000000 0100 06C90446501388 00")
        );
    }
}
