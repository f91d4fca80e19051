use alloy_primitives::B256;
use growstreams_types::{ActorId, CodeId};
use sha3::{Digest, Keccak256};
use subxt::config::{substrate::BlakeTwo256, Hasher};

/// Domain prefix of program ids created by a user-signed upload.
const PROGRAM_FROM_USER: &[u8] = b"program_from_user";

/// Keccak-256 over the concatenation of `parts`.
pub fn keccak256_concat(parts: &[&[u8]]) -> B256 {
    let mut h = Keccak256::new();
    for part in parts {
        h.update(part);
    }
    let out = h.finalize();
    let mut b = [0u8; 32];
    b.copy_from_slice(out.as_slice());
    B256::new(b)
}

pub fn blake2_256(bytes: &[u8]) -> [u8; 32] {
    BlakeTwo256::hash(bytes).0
}

/// Code id as the gear pallet derives it: `blake2_256(code)`.
pub fn code_id_for(code: &[u8]) -> CodeId {
    CodeId::new(blake2_256(code))
}

/// Program id of an `upload_program`: `blake2_256("program_from_user" ++ code_id ++ salt)`.
pub fn program_id_for(code_id: CodeId, salt: &[u8]) -> ActorId {
    let mut preimage = Vec::with_capacity(PROGRAM_FROM_USER.len() + 32 + salt.len());
    preimage.extend_from_slice(PROGRAM_FROM_USER);
    preimage.extend_from_slice(code_id.as_slice());
    preimage.extend_from_slice(salt);
    ActorId::new(blake2_256(&preimage))
}
