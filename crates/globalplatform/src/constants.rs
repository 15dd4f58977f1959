//! Header bytes, tags and fixed sizes for card manager and applet commands

/// Class bytes
pub mod cla {
    /// Interindustry class, used for SELECT
    pub const ISO7816: u8 = 0x00;
    /// Card manager commands before wrapping
    pub const GP: u8 = 0x80;
    /// Token applet commands
    pub const APPLET: u8 = 0xB0;
    /// OR-ed into the class of a command carrying a C-MAC
    pub const SECURE_MESSAGING: u8 = 0x04;
}

/// Instruction bytes
pub mod ins {
    #![allow(missing_docs)]

    pub const SELECT: u8 = 0xA4;
    pub const GET_DATA: u8 = 0xCA;
    pub const INITIALIZE_UPDATE: u8 = 0x50;
    pub const EXTERNAL_AUTHENTICATE: u8 = 0x82;
    pub const DELETE: u8 = 0xE4;
    pub const LOAD: u8 = 0xE8;
    pub const INSTALL: u8 = 0xE6;
    pub const PUT_KEY: u8 = 0xD8;

    // token applet
    pub const GET_STATUS: u8 = 0x3C;
    pub const GET_VERSION: u8 = 0x70;
    pub const LIST_OBJECTS: u8 = 0x58;
    pub const SET_ISSUER_INFO: u8 = 0xF4;
}

/// P1/P2 values
pub mod param {
    /// SELECT P1: by AID
    pub const SELECT_BY_NAME: u8 = 0x04;
    /// EXTERNAL AUTHENTICATE P1: C-MAC only
    pub const LEVEL_CMAC: u8 = 0x01;
    /// EXTERNAL AUTHENTICATE P1: C-MAC and data encryption
    pub const LEVEL_CMAC_ENC: u8 = 0x03;
    /// INSTALL P1: for load
    pub const INSTALL_FOR_LOAD: u8 = 0x02;
    /// INSTALL P1: for install and make selectable
    pub const INSTALL_AND_MAKE_SELECTABLE: u8 = 0x0C;
    /// LOAD P1: further blocks follow
    pub const LOAD_MORE_BLOCKS: u8 = 0x00;
    /// LOAD P1: final block
    pub const LOAD_LAST_BLOCK: u8 = 0x80;
    /// PUT KEY P2 flag: several keys in one command
    pub const PUT_KEY_MULTIPLE: u8 = 0x80;
}

/// BER-TLV tags in command data
pub mod tags {
    /// Application identifier in DELETE
    pub const AID: u8 = 0x4F;
    /// Load file data block
    pub const LOAD_FILE_DATA_BLOCK: u8 = 0xC4;
    /// System parameters of INSTALL [for load]
    pub const LOAD_PARAMETERS: u8 = 0xEF;
    /// Non-volatile code limit inside the load parameters
    pub const NON_VOLATILE_CODE_LIMIT: u8 = 0xC6;
    /// Applet install parameters
    pub const INSTALL_PARAMETERS: u8 = 0xC9;
}

/// Fixed lengths
pub mod sizes {
    /// CPLC buffer: 45 data bytes and the status word
    pub const CPLC_DATA: usize = 47;
    /// Le of GET DATA for CPLC
    pub const CPLC_LE: u8 = 0x2D;
    /// INITIALIZE UPDATE response data
    pub const INITIALIZE_UPDATE_RESPONSE: usize = 28;
    /// Host challenge
    pub const HOST_CHALLENGE: usize = 8;
    /// Le of the applet GET STATUS
    pub const STATUS_LE: u8 = 0x10;
    /// Le of LIST OBJECTS
    pub const LIST_OBJECTS_LE: u8 = 0x0E;
    /// GET VERSION buffer: 4 build id bytes and the status word
    pub const VERSION_RESPONSE: usize = 6;
    /// SET ISSUER INFO data
    pub const ISSUER_INFO: usize = 224;
    /// C-MAC
    pub const MAC: usize = 8;
}
