//! The MTProto service schema (`mtproto.tl`), maintained by hand.
//!
//! `rpc_result`, `msg_container`, `message` and `gzip_packed` are absent on
//! purpose: their payloads are opaque `Object`s, so the session engine reads
//! them directly instead of through a typed struct.

/// Bare constructors.
pub mod types {
    use crate::RawVec;

    tl_struct!(
        /// `resPQ#05162463`
        ResPq = 0x05162463 {
            nonce: [u8; 16],
            server_nonce: [u8; 16],
            pq: Vec<u8>,
            server_public_key_fingerprints: Vec<i64>,
        }
    );

    tl_struct!(
        /// `p_q_inner_data#83c95aec`
        PQInnerData = 0x83c95aec {
            pq: Vec<u8>,
            p: Vec<u8>,
            q: Vec<u8>,
            nonce: [u8; 16],
            server_nonce: [u8; 16],
            new_nonce: [u8; 32],
        }
    );

    tl_struct!(
        /// `p_q_inner_data_dc#a9f55f95`
        PQInnerDataDc = 0xa9f55f95 {
            pq: Vec<u8>,
            p: Vec<u8>,
            q: Vec<u8>,
            nonce: [u8; 16],
            server_nonce: [u8; 16],
            new_nonce: [u8; 32],
            dc: i32,
        }
    );

    tl_struct!(
        /// `server_DH_params_fail#79cb045d`
        ServerDhParamsFail = 0x79cb045d {
            nonce: [u8; 16],
            server_nonce: [u8; 16],
            new_nonce_hash: [u8; 16],
        }
    );

    tl_struct!(
        /// `server_DH_params_ok#d0e8075c`
        ServerDhParamsOk = 0xd0e8075c {
            nonce: [u8; 16],
            server_nonce: [u8; 16],
            encrypted_answer: Vec<u8>,
        }
    );

    tl_struct!(
        /// `server_DH_inner_data#b5890dba`
        ServerDhInnerData = 0xb5890dba {
            nonce: [u8; 16],
            server_nonce: [u8; 16],
            g: i32,
            dh_prime: Vec<u8>,
            g_a: Vec<u8>,
            server_time: i32,
        }
    );

    tl_struct!(
        /// `client_DH_inner_data#6643b654`
        ClientDhInnerData = 0x6643b654 {
            nonce: [u8; 16],
            server_nonce: [u8; 16],
            retry_id: i64,
            g_b: Vec<u8>,
        }
    );

    tl_struct!(
        /// `dh_gen_ok#3bcbf734`
        DhGenOk = 0x3bcbf734 {
            nonce: [u8; 16],
            server_nonce: [u8; 16],
            new_nonce_hash1: [u8; 16],
        }
    );

    tl_struct!(
        /// `dh_gen_retry#46dc1fb9`
        DhGenRetry = 0x46dc1fb9 {
            nonce: [u8; 16],
            server_nonce: [u8; 16],
            new_nonce_hash2: [u8; 16],
        }
    );

    tl_struct!(
        /// `dh_gen_fail#a69dae02`
        DhGenFail = 0xa69dae02 {
            nonce: [u8; 16],
            server_nonce: [u8; 16],
            new_nonce_hash3: [u8; 16],
        }
    );

    tl_struct!(
        /// `rpc_error#2144ca19`
        RpcError = 0x2144ca19 {
            error_code: i32,
            error_message: String,
        }
    );

    tl_struct!(
        /// `pong#347773c5`
        Pong = 0x347773c5 {
            msg_id: i64,
            ping_id: i64,
        }
    );

    tl_struct!(
        /// `new_session_created#9ec20908`
        NewSessionCreated = 0x9ec20908 {
            first_msg_id: i64,
            unique_id: i64,
            server_salt: i64,
        }
    );

    tl_struct!(
        /// `msgs_ack#62d6b459`
        MsgsAck = 0x62d6b459 {
            msg_ids: Vec<i64>,
        }
    );

    tl_struct!(
        /// `bad_msg_notification#a7eff811`
        BadMsgNotification = 0xa7eff811 {
            bad_msg_id: i64,
            bad_msg_seqno: i32,
            error_code: i32,
        }
    );

    tl_struct!(
        /// `bad_server_salt#edab447b`
        BadServerSalt = 0xedab447b {
            bad_msg_id: i64,
            bad_msg_seqno: i32,
            error_code: i32,
            new_server_salt: i64,
        }
    );

    tl_struct!(
        /// `msg_resend_req#7d861a08`
        MsgResendReq = 0x7d861a08 {
            msg_ids: Vec<i64>,
        }
    );

    tl_struct!(
        /// `msgs_state_req#da69fb52`
        MsgsStateReq = 0xda69fb52 {
            msg_ids: Vec<i64>,
        }
    );

    tl_struct!(
        /// `msgs_state_info#04deb57d`
        MsgsStateInfo = 0x04deb57d {
            req_msg_id: i64,
            info: Vec<u8>,
        }
    );

    tl_struct!(
        /// `msgs_all_info#8cc0d131`
        MsgsAllInfo = 0x8cc0d131 {
            msg_ids: Vec<i64>,
            info: Vec<u8>,
        }
    );

    tl_struct!(
        /// `msg_detailed_info#276d3ec6`
        MsgDetailedInfo = 0x276d3ec6 {
            msg_id: i64,
            answer_msg_id: i64,
            bytes: i32,
            status: i32,
        }
    );

    tl_struct!(
        /// `msg_new_detailed_info#809db6df`
        MsgNewDetailedInfo = 0x809db6df {
            answer_msg_id: i64,
            bytes: i32,
            status: i32,
        }
    );

    tl_struct!(
        /// `future_salt#0949d9dc`
        FutureSalt = 0x0949d9dc {
            valid_since: i32,
            valid_until: i32,
            salt: i64,
        }
    );

    tl_struct!(
        /// `future_salts#ae500895`, a bare vector of bare `future_salt`s
        FutureSalts = 0xae500895 {
            req_msg_id: i64,
            now: i32,
            salts: RawVec<FutureSalt>,
        }
    );

    tl_struct!(
        /// `destroy_session_ok#e22045fc`
        DestroySessionOk = 0xe22045fc {
            session_id: i64,
        }
    );

    tl_struct!(
        /// `destroy_session_none#62d350c9`
        DestroySessionNone = 0x62d350c9 {
            session_id: i64,
        }
    );
}

/// Boxed types.
pub mod enums {
    use super::types;

    tl_enum!(ResPq { ResPq(types::ResPq) });

    tl_enum!(PQInnerData {
        PQInnerData(types::PQInnerData),
        Dc(types::PQInnerDataDc),
    });

    tl_enum!(ServerDhParams {
        Fail(types::ServerDhParamsFail),
        Ok(types::ServerDhParamsOk),
    });

    tl_enum!(ServerDhInnerData { ServerDhInnerData(types::ServerDhInnerData) });

    tl_enum!(ClientDhInnerData { ClientDhInnerData(types::ClientDhInnerData) });

    tl_enum!(SetClientDhParamsAnswer {
        DhGenOk(types::DhGenOk),
        DhGenRetry(types::DhGenRetry),
        DhGenFail(types::DhGenFail),
    });

    tl_enum!(RpcError { RpcError(types::RpcError) });

    tl_enum!(Pong { Pong(types::Pong) });

    tl_enum!(NewSession { Created(types::NewSessionCreated) });

    tl_enum!(MsgsAck { MsgsAck(types::MsgsAck) });

    tl_enum!(BadMsgNotification {
        BadMsgNotification(types::BadMsgNotification),
        BadServerSalt(types::BadServerSalt),
    });

    tl_enum!(MsgResendReq { MsgResendReq(types::MsgResendReq) });

    tl_enum!(MsgsStateReq { MsgsStateReq(types::MsgsStateReq) });

    tl_enum!(MsgsStateInfo { MsgsStateInfo(types::MsgsStateInfo) });

    tl_enum!(MsgsAllInfo { MsgsAllInfo(types::MsgsAllInfo) });

    tl_enum!(MsgDetailedInfo {
        MsgDetailedInfo(types::MsgDetailedInfo),
        MsgNewDetailedInfo(types::MsgNewDetailedInfo),
    });

    tl_enum!(FutureSalts { FutureSalts(types::FutureSalts) });

    tl_enum!(DestroySessionRes {
        Ok(types::DestroySessionOk),
        None(types::DestroySessionNone),
    });
}

/// RPC functions.
pub mod functions {
    use super::enums;

    tl_function!(
        /// `req_pq_multi#be7e8ef1 nonce:int128 = ResPQ`
        ReqPqMulti = 0xbe7e8ef1 { nonce: [u8; 16] } -> enums::ResPq
    );

    tl_function!(
        /// `req_DH_params#d712e4be`
        ReqDhParams = 0xd712e4be {
            nonce: [u8; 16],
            server_nonce: [u8; 16],
            p: Vec<u8>,
            q: Vec<u8>,
            public_key_fingerprint: i64,
            encrypted_data: Vec<u8>,
        } -> enums::ServerDhParams
    );

    tl_function!(
        /// `set_client_DH_params#f5045f1f`
        SetClientDhParams = 0xf5045f1f {
            nonce: [u8; 16],
            server_nonce: [u8; 16],
            encrypted_data: Vec<u8>,
        } -> enums::SetClientDhParamsAnswer
    );

    tl_function!(
        /// `ping#7abe77ec ping_id:long = Pong`
        Ping = 0x7abe77ec { ping_id: i64 } -> enums::Pong
    );

    tl_function!(
        /// `ping_delay_disconnect#f3427b8c ping_id:long disconnect_delay:int = Pong`
        PingDelayDisconnect = 0xf3427b8c { ping_id: i64, disconnect_delay: i32 } -> enums::Pong
    );

    tl_function!(
        /// `get_future_salts#b921bd04 num:int = FutureSalts`
        GetFutureSalts = 0xb921bd04 { num: i32 } -> enums::FutureSalts
    );

    tl_function!(
        /// `destroy_session#e7512126 session_id:long = DestroySessionRes`
        DestroySession = 0xe7512126 { session_id: i64 } -> enums::DestroySessionRes
    );
}
