// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fil_core_runtime::runtime::{ActorCode, ComputeFunctionID, Runtime, VerifySignatureParams};
use fil_core_runtime::{actor_error, decode_params, ActorError, SYSTEM_ACTOR_ADDR};
use fvm_ipld_encoding::ipld_block::IpldBlock;
use fvm_ipld_encoding::tuple::*;
use fvm_ipld_encoding::strict_bytes;
use fvm_shared::address::{Address, Protocol};
use fvm_shared::crypto::signature::{Signature, SignatureType};
use fvm_shared::{MethodNum, METHOD_CONSTRUCTOR};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

/// Account actor methods available
#[derive(FromPrimitive)]
#[repr(u64)]
pub enum Method {
    Constructor = METHOD_CONSTRUCTOR,
    PubkeyAddress = 2,
    AuthenticateMessage = 3,
}

/// State includes the address for the actor
#[derive(Serialize_tuple, Deserialize_tuple, Debug, Clone)]
pub struct State {
    pub address: Address,
}

#[derive(Debug, Serialize_tuple, Deserialize_tuple)]
pub struct AuthenticateMessageParams {
    #[serde(with = "strict_bytes")]
    pub signature: Vec<u8>,
    #[serde(with = "strict_bytes")]
    pub message: Vec<u8>,
}

/// Account Actor
pub struct Actor;

impl Actor {
    /// Constructor for Account actor
    pub fn constructor(rt: &impl Runtime, args: Option<IpldBlock>) -> Result<(), ActorError> {
        rt.validate_immediate_caller_is(std::iter::once(&SYSTEM_ACTOR_ADDR))?;
        let address: Address = decode_params!(args);
        match address.protocol() {
            Protocol::Secp256k1 | Protocol::BLS => {}
            protocol => {
                return Err(actor_error!(illegal_argument;
                    "address must use BLS or SECP protocol, got {}", protocol));
            }
        }
        rt.create(&State { address })?;
        Ok(())
    }

    /// Fetches the pubkey-type address from this actor.
    pub fn pubkey_address(rt: &impl Runtime) -> Result<Address, ActorError> {
        rt.validate_immediate_caller_accept_any()?;
        let st: State = rt.state()?;
        Ok(st.address)
    }

    /// Authenticates whether the provided signature is valid for the provided message.
    /// Errors with USR_ILLEGAL_ARGUMENT if the authentication is invalid.
    pub fn authenticate_message(
        rt: &impl Runtime,
        args: Option<IpldBlock>,
    ) -> Result<(), ActorError> {
        rt.validate_immediate_caller_accept_any()?;
        let params: AuthenticateMessageParams = decode_params!(args);
        let st: State = rt.state()?;
        let sig_type = match st.address.protocol() {
            Protocol::Secp256k1 => SignatureType::Secp256k1,
            Protocol::BLS => SignatureType::BLS,
            protocol => {
                return Err(actor_error!(illegal_state;
                    "account address must use BLS or SECP protocol, got {}", protocol));
            }
        };
        let verify = VerifySignatureParams {
            signature: Signature { sig_type, bytes: params.signature },
            signer: st.address,
            plaintext: params.message,
        };
        let valid: bool = rt
            .compute(ComputeFunctionID::VerifySignature, IpldBlock::serialize_cbor(&verify)?)?
            .ok_or_else(|| actor_error!(illegal_state; "signature verification returned nothing"))?
            .deserialize()?;
        if !valid {
            return Err(actor_error!(illegal_argument;
                "failed to authenticate message, signature invalid"));
        }
        Ok(())
    }
}

impl ActorCode for Actor {
    type Methods = Method;

    fn name() -> &'static str {
        "Account"
    }

    fn invoke_method<RT>(
        rt: &RT,
        method: MethodNum,
        args: Option<IpldBlock>,
    ) -> Result<Option<IpldBlock>, ActorError>
    where
        RT: Runtime,
        RT::Blockstore: Clone,
    {
        match FromPrimitive::from_u64(method) {
            Some(Method::Constructor) => {
                Self::constructor(rt, args)?;
                Ok(None)
            }
            Some(Method::PubkeyAddress) => {
                let addr = Self::pubkey_address(rt)?;
                Ok(IpldBlock::serialize_cbor(&addr)?)
            }
            Some(Method::AuthenticateMessage) => {
                Self::authenticate_message(rt, args)?;
                Ok(None)
            }
            None => Err(actor_error!(unhandled_message; "Invalid method")),
        }
    }
}
