//! Hand-written wire types for the DH handshake and the message envelope.
//!
//! These pin exactly the slice of the Telegram TL schema this crate's
//! handshake and session pipeline need — the full schema (RPC methods,
//! user-facing types) is an external collaborator this crate doesn't
//! parse or generate; see [`layer_tl_types`] for the primitives these are
//! built from.

use layer_tl_types::{Deserializable, Serializable, deserialize};

macro_rules! boxed_struct {
    ($name:ident, $id:expr, { $($field:ident : $ty:ty),* $(,)? }) => {
        #[derive(Clone, Debug, PartialEq)]
        pub struct $name {
            $(pub $field: $ty,)*
        }

        impl Serializable for $name {
            fn serialize(&self, buf: &mut impl Extend<u8>) {
                ($id as u32).serialize(buf);
                $(self.$field.serialize(buf);)*
            }
        }

        impl Deserializable for $name {
            fn deserialize(buf: deserialize::Buffer) -> deserialize::Result<Self> {
                let id = u32::deserialize(buf)?;
                if id != $id as u32 {
                    return Err(deserialize::Error::UnexpectedConstructor { id });
                }
                Ok(Self { $($field: Deserializable::deserialize(buf)?,)* })
            }
        }
    };
}

// ─── Round 1 ─────────────────────────────────────────────────────────────────

boxed_struct!(ReqPq, 0x6046_9778, { nonce: [u8; 16] });

boxed_struct!(ResPq, 0x0516_2463, {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    pq: Vec<u8>,
    server_public_key_fingerprints: Vec<i64>,
});

boxed_struct!(PqInnerData, 0x83c9_5aec, {
    pq: Vec<u8>,
    p: Vec<u8>,
    q: Vec<u8>,
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    new_nonce: [u8; 32],
});

// ─── Round 2 ─────────────────────────────────────────────────────────────────

boxed_struct!(ReqDhParams, 0xd712_e4be, {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    p: Vec<u8>,
    q: Vec<u8>,
    public_key_fingerprint: i64,
    encrypted_data: Vec<u8>,
});

boxed_struct!(ServerDhParamsOk, 0xd0e8_075c, {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    encrypted_answer: Vec<u8>,
});

boxed_struct!(ServerDhParamsFail, 0x79cb_045d, {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    new_nonce_hash: [u8; 16],
});

/// `Server_DH_Params` — either an `ok` or a `fail` reply.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerDhParams {
    Ok(ServerDhParamsOk),
    Fail(ServerDhParamsFail),
}

impl Deserializable for ServerDhParams {
    fn deserialize(buf: deserialize::Buffer) -> deserialize::Result<Self> {
        let id = u32::deserialize(buf)?;
        match id {
            0xd0e8_075c => Ok(Self::Ok(ServerDhParamsOk::deserialize_body(buf)?)),
            0x79cb_045d => Ok(Self::Fail(ServerDhParamsFail::deserialize_body(buf)?)),
            id => Err(deserialize::Error::UnexpectedConstructor { id }),
        }
    }
}

boxed_struct!(ServerDhInnerData, 0xb589_0dba, {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    g: i32,
    dh_prime: Vec<u8>,
    g_a: Vec<u8>,
    server_time: i32,
});

// ─── Round 3 ─────────────────────────────────────────────────────────────────

boxed_struct!(ClientDhInnerData, 0x6643_b654, {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    retry_id: i64,
    g_b: Vec<u8>,
});

boxed_struct!(SetClientDhParams, 0xf504_5f1f, {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    encrypted_data: Vec<u8>,
});

boxed_struct!(DhGenOk, 0x3bcb_f734, {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    new_nonce_hash1: [u8; 16],
});

boxed_struct!(DhGenRetry, 0x46dc_1fb9, {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    new_nonce_hash2: [u8; 16],
});

boxed_struct!(DhGenFail, 0xa69d_ae02, {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    new_nonce_hash3: [u8; 16],
});

/// `Set_client_DH_params_answer` — ok, retry, or fail.
#[derive(Clone, Debug, PartialEq)]
pub enum SetClientDhParamsAnswer {
    Ok(DhGenOk),
    Retry(DhGenRetry),
    Fail(DhGenFail),
}

impl Deserializable for SetClientDhParamsAnswer {
    fn deserialize(buf: deserialize::Buffer) -> deserialize::Result<Self> {
        let id = u32::deserialize(buf)?;
        match id {
            0x3bcb_f734 => Ok(Self::Ok(DhGenOk::deserialize_body(buf)?)),
            0x46dc_1fb9 => Ok(Self::Retry(DhGenRetry::deserialize_body(buf)?)),
            0xa69d_ae02 => Ok(Self::Fail(DhGenFail::deserialize_body(buf)?)),
            id => Err(deserialize::Error::UnexpectedConstructor { id }),
        }
    }
}

// The enum variants above need to deserialize their fields *after* the caller
// already consumed the constructor ID to decide which variant to build, so
// each boxed struct also gets a body-only deserializer.
macro_rules! body_deserializer {
    ($name:ident, { $($field:ident),* $(,)? }) => {
        impl $name {
            fn deserialize_body(buf: deserialize::Buffer) -> deserialize::Result<Self> {
                Ok(Self { $($field: Deserializable::deserialize(buf)?,)* })
            }
        }
    };
}

body_deserializer!(ServerDhParamsOk, { nonce, server_nonce, encrypted_answer });
body_deserializer!(ServerDhParamsFail, { nonce, server_nonce, new_nonce_hash });
body_deserializer!(DhGenOk, { nonce, server_nonce, new_nonce_hash1 });
body_deserializer!(DhGenRetry, { nonce, server_nonce, new_nonce_hash2 });
body_deserializer!(DhGenFail, { nonce, server_nonce, new_nonce_hash3 });

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn req_pq_roundtrips() {
        let v = ReqPq { nonce: [7u8; 16] };
        let bytes = v.to_bytes();
        let back = ReqPq::from_bytes(&bytes).unwrap();
        assert_eq!(v, back);
    }

    #[test]
    fn res_pq_roundtrips() {
        let v = ResPq {
            nonce: [1; 16],
            server_nonce: [2; 16],
            pq: vec![1, 2, 3, 4, 5, 6, 7, 8],
            server_public_key_fingerprints: vec![111, 222],
        };
        let bytes = v.to_bytes();
        let back = ResPq::from_bytes(&bytes).unwrap();
        assert_eq!(v, back);
    }

    #[test]
    fn server_dh_params_dispatches_on_constructor() {
        let ok = ServerDhParamsOk { nonce: [1; 16], server_nonce: [2; 16], encrypted_answer: vec![9; 16] };
        let bytes = ok.to_bytes();
        match ServerDhParams::from_bytes(&bytes).unwrap() {
            ServerDhParams::Ok(x) => assert_eq!(x, ok),
            ServerDhParams::Fail(_) => panic!("wrong variant"),
        }
    }

    #[test]
    fn set_client_dh_params_answer_dispatches_on_constructor() {
        let retry = DhGenRetry { nonce: [3; 16], server_nonce: [4; 16], new_nonce_hash2: [5; 16] };
        let bytes = retry.to_bytes();
        match SetClientDhParamsAnswer::from_bytes(&bytes).unwrap() {
            SetClientDhParamsAnswer::Retry(x) => assert_eq!(x, retry),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn unknown_constructor_is_rejected() {
        let mut bytes = ReqPq { nonce: [0; 16] }.to_bytes();
        bytes[0] = 0xff; // corrupt constructor id
        assert!(ResPq::from_bytes(&bytes).is_err());
    }
}
