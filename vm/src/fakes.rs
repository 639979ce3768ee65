// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use anyhow::anyhow;
use cid::Cid;
use fil_core_runtime::runtime::{Primitives, Verifier};
use fvm_shared::address::Address;
use fvm_shared::commcid::FIL_COMMITMENT_UNSEALED;
use fvm_shared::crypto::signature::Signature;
use fvm_shared::piece::PieceInfo;
use fvm_shared::sector::{RegisteredSealProof, SealVerifyInfo, WindowPoStVerifyInfo};
use multihash::{Code, MultihashDigest};

// static values for predictable testing
pub const TEST_VM_RAND_ARRAY: [u8; 32] = [
    1u8, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25,
    26, 27, 28, 29, 30, 31, 32,
];
pub const TEST_VM_INVALID_POST: &str = "i_am_invalid_post";
pub const TEST_VM_INVALID_SEAL: &str = "i_am_invalid_seal";
pub const TEST_VM_INVALID_SIGNATURE: &str = "i_am_invalid_signature";

/// Syscalls that accept everything except the marker values above.
#[derive(Default, Clone, Copy, Debug)]
pub struct FakePrimitives;

impl Primitives for FakePrimitives {
    fn hash_blake2b(&self, data: &[u8]) -> [u8; 32] {
        let hash = blake2b_simd::Params::new().hash_length(32).to_state().update(data).finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(hash.as_bytes());
        out
    }

    fn compute_unsealed_sector_cid(
        &self,
        proof_type: RegisteredSealProof,
        pieces: &[PieceInfo],
    ) -> Result<Cid, anyhow::Error> {
        let mut buf = format!("{:?}", proof_type).into_bytes();
        for p in pieces {
            buf.extend_from_slice(&p.cid.to_bytes());
            buf.extend_from_slice(&p.size.0.to_be_bytes());
        }
        Ok(Cid::new_v1(FIL_COMMITMENT_UNSEALED, Code::Blake2b256.digest(&buf)))
    }

    fn verify_signature(
        &self,
        signature: &Signature,
        signer: &Address,
        _plaintext: &[u8],
    ) -> Result<(), anyhow::Error> {
        if signature.bytes == TEST_VM_INVALID_SIGNATURE.as_bytes() {
            return Err(anyhow!("invalid signature for {}", signer));
        }
        Ok(())
    }
}

impl Verifier for FakePrimitives {
    fn verify_seal(&self, vi: &SealVerifyInfo) -> Result<(), anyhow::Error> {
        if vi.proof == TEST_VM_INVALID_SEAL.as_bytes() {
            return Err(anyhow!("invalid seal proof for sector {}", vi.sector_id.number));
        }
        Ok(())
    }

    fn verify_post(&self, verify_info: &WindowPoStVerifyInfo) -> Result<(), anyhow::Error> {
        let invalid = TEST_VM_INVALID_POST.as_bytes();
        if verify_info.proofs.iter().any(|p| p.proof_bytes == invalid) {
            return Err(anyhow!("invalid post"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fvm_shared::crypto::signature::SignatureType;
    use fvm_shared::piece::PaddedPieceSize;
    use fvm_shared::randomness::Randomness;
    use fvm_shared::sector::{PoStProof, RegisteredPoStProof, SectorID};

    fn piece(seed: u8, size: u64) -> PieceInfo {
        PieceInfo {
            cid: Cid::new_v1(FIL_COMMITMENT_UNSEALED, Code::Blake2b256.digest(&[seed])),
            size: PaddedPieceSize(size),
        }
    }

    fn seal_info(proof: &[u8]) -> SealVerifyInfo {
        let cid = Cid::new_v1(FIL_COMMITMENT_UNSEALED, Code::Blake2b256.digest(b"sector"));
        SealVerifyInfo {
            registered_proof: RegisteredSealProof::StackedDRG32GiBV1P1,
            sector_id: SectorID { miner: 1000, number: 7 },
            deal_ids: vec![],
            randomness: Randomness(vec![1, 2, 3, 4]),
            interactive_randomness: Randomness(vec![5, 6, 7, 8]),
            proof: proof.to_vec(),
            sealed_cid: cid,
            unsealed_cid: cid,
        }
    }

    fn post_info(proofs: &[&[u8]]) -> WindowPoStVerifyInfo {
        WindowPoStVerifyInfo {
            randomness: Randomness(vec![10, 11, 12, 13]),
            proofs: proofs
                .iter()
                .map(|b| PoStProof {
                    post_proof: RegisteredPoStProof::StackedDRGWindow32GiBV1P1,
                    proof_bytes: b.to_vec(),
                })
                .collect(),
            challenged_sectors: vec![],
            prover: 1000,
        }
    }

    #[test]
    fn signature_marker_fails() {
        let p = FakePrimitives;
        let signer = Address::new_id(100);
        let good = Signature { sig_type: SignatureType::BLS, bytes: vec![1, 2, 3] };
        let bad = Signature {
            sig_type: SignatureType::BLS,
            bytes: TEST_VM_INVALID_SIGNATURE.as_bytes().to_vec(),
        };
        assert!(p.verify_signature(&good, &signer, b"hello").is_ok());
        assert!(p.verify_signature(&bad, &signer, b"hello").is_err());
    }

    #[test]
    fn blake2b_is_stable() {
        let p = FakePrimitives;
        assert_eq!(p.hash_blake2b(b"abc"), p.hash_blake2b(b"abc"));
        assert_ne!(p.hash_blake2b(b"abc"), p.hash_blake2b(b"abd"));
    }

    #[test]
    fn seal_marker_fails() {
        let p = FakePrimitives;
        assert!(p.verify_seal(&seal_info(b"seal")).is_ok());
        let err = p.verify_seal(&seal_info(TEST_VM_INVALID_SEAL.as_bytes())).unwrap_err();
        assert!(err.to_string().contains("sector 7"));
    }

    #[test]
    fn post_marker_fails_in_any_position() {
        let p = FakePrimitives;
        assert!(p.verify_post(&post_info(&[b"proof1", b"proof2"])).is_ok());
        assert!(p.verify_post(&post_info(&[])).is_ok());
        assert!(p.verify_post(&post_info(&[b"proof1", TEST_VM_INVALID_POST.as_bytes()])).is_err());
    }

    #[test]
    fn unsealed_cid_depends_on_pieces_and_proof() {
        let p = FakePrimitives;
        let proof = RegisteredSealProof::StackedDRG32GiBV1P1;
        let pieces = vec![piece(1, 1 << 20), piece(2, 1 << 20)];

        let cid = p.compute_unsealed_sector_cid(proof, &pieces).unwrap();
        assert_eq!(FIL_COMMITMENT_UNSEALED, cid.codec());
        assert_eq!(cid, p.compute_unsealed_sector_cid(proof, &pieces).unwrap());

        let reordered = vec![pieces[1].clone(), pieces[0].clone()];
        assert_ne!(cid, p.compute_unsealed_sector_cid(proof, &reordered).unwrap());
        let resized = vec![piece(1, 1 << 21), piece(2, 1 << 20)];
        assert_ne!(cid, p.compute_unsealed_sector_cid(proof, &resized).unwrap());
        let other = RegisteredSealProof::StackedDRG64GiBV1P1;
        assert_ne!(cid, p.compute_unsealed_sector_cid(other, &pieces).unwrap());
    }
}
