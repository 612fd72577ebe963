//! Standard script classification and coinstake-op helpers.

pub const OP_ISCOINSTAKE: u8 = 0xb8;

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUAL: u8 = 0x87;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;
const OP_IF: u8 = 0x63;
const OP_NOTIF: u8 = 0x64;
const OP_ELSE: u8 = 0x67;
const OP_ENDIF: u8 = 0x68;
const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;
const OP_PUSHDATA4: u8 = 0x4e;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScriptType {
    P2Pk,
    P2Pkh,
    P2Sh,
    CondStake,
    Unknown,
}

pub fn classify_script_pubkey(script: &[u8]) -> ScriptType {
    if has_coinstake_op(script) {
        ScriptType::CondStake
    } else if is_p2pkh(script) {
        ScriptType::P2Pkh
    } else if is_p2sh(script) {
        ScriptType::P2Sh
    } else if is_p2pk(script) {
        ScriptType::P2Pk
    } else {
        ScriptType::Unknown
    }
}

/// Detects a delegated-staking script. The canonical form is
/// `OP_ISCOINSTAKE OP_IF <stake branch> OP_ELSE <spend branch> OP_ENDIF`;
/// only the leading opcode is consulted, matching consensus.
pub fn has_coinstake_op(script: &[u8]) -> bool {
    script.first() == Some(&OP_ISCOINSTAKE)
}

/// Splits a conditional stake script into its stake and spend branches.
/// Returns `None` when the script is not the canonical conditional form.
pub fn split_coinstake_script(script: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
    if script.len() < 4 || script[0] != OP_ISCOINSTAKE || script[1] != OP_IF {
        return None;
    }

    let mut cursor = 2usize;
    let mut depth = 0usize;
    let mut else_at: Option<usize> = None;
    let mut endif_at: Option<usize> = None;

    while cursor < script.len() {
        let at = cursor;
        let opcode = script[cursor];
        cursor += 1;
        match opcode {
            0x01..=0x4b => cursor += opcode as usize,
            OP_PUSHDATA1 => {
                let len = *script.get(cursor)? as usize;
                cursor += 1 + len;
            }
            OP_PUSHDATA2 => {
                let bytes = script.get(cursor..cursor + 2)?;
                cursor += 2 + u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
            }
            OP_PUSHDATA4 => {
                let bytes = script.get(cursor..cursor + 4)?;
                cursor += 4 + u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
            }
            OP_IF | OP_NOTIF => depth += 1,
            OP_ELSE => {
                if depth == 0 && else_at.is_none() {
                    else_at = Some(at);
                }
            }
            OP_ENDIF => {
                if depth == 0 {
                    endif_at = Some(at);
                    break;
                }
                depth -= 1;
            }
            _ => {}
        }
    }

    let else_at = else_at?;
    let endif_at = endif_at?;
    if cursor > script.len() || endif_at != script.len() - 1 {
        return None;
    }

    let stake = script[2..else_at].to_vec();
    let spend = script[else_at + 1..endif_at].to_vec();
    Some((stake, spend))
}

fn is_p2pkh(script: &[u8]) -> bool {
    script.len() == 25
        && script[0] == OP_DUP
        && script[1] == OP_HASH160
        && script[2] == 0x14
        && script[23] == OP_EQUALVERIFY
        && script[24] == OP_CHECKSIG
}

fn is_p2sh(script: &[u8]) -> bool {
    script.len() == 23 && script[0] == OP_HASH160 && script[1] == 0x14 && script[22] == OP_EQUAL
}

fn is_p2pk(script: &[u8]) -> bool {
    let key_len = match script.first().copied() {
        Some(len @ 33) => len,
        Some(len @ 65) => len,
        _ => return false,
    };

    let expected_len = key_len as usize + 2;
    script.len() == expected_len && script[script.len() - 1] == OP_CHECKSIG
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p2pkh(tag: u8) -> Vec<u8> {
        let mut script = Vec::with_capacity(25);
        script.extend_from_slice(&[OP_DUP, OP_HASH160, 0x14]);
        script.extend_from_slice(&[tag; 20]);
        script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
        script
    }

    fn cond_stake(stake_tag: u8, spend_tag: u8) -> Vec<u8> {
        let mut script = vec![OP_ISCOINSTAKE, OP_IF];
        script.extend_from_slice(&p2pkh(stake_tag));
        script.push(OP_ELSE);
        script.extend_from_slice(&p2pkh(spend_tag));
        script.push(OP_ENDIF);
        script
    }

    #[test]
    fn classification() {
        assert_eq!(classify_script_pubkey(&p2pkh(0xaa)), ScriptType::P2Pkh);
        assert_eq!(
            classify_script_pubkey(&cond_stake(0xaa, 0xbb)),
            ScriptType::CondStake
        );
        assert_eq!(classify_script_pubkey(&[0x51]), ScriptType::Unknown);
    }

    #[test]
    fn split_returns_both_branches() {
        let script = cond_stake(0xaa, 0xbb);
        assert!(has_coinstake_op(&script));
        let (stake, spend) = split_coinstake_script(&script).expect("split");
        assert_eq!(stake, p2pkh(0xaa));
        assert_eq!(spend, p2pkh(0xbb));
    }

    #[test]
    fn split_rejects_malformed_scripts() {
        assert!(split_coinstake_script(&p2pkh(0xaa)).is_none());

        // Missing OP_ENDIF.
        let mut script = vec![OP_ISCOINSTAKE, OP_IF];
        script.extend_from_slice(&p2pkh(0xaa));
        script.push(OP_ELSE);
        script.extend_from_slice(&p2pkh(0xbb));
        assert!(split_coinstake_script(&script).is_none());

        // Trailing bytes after OP_ENDIF.
        let mut script = cond_stake(0xaa, 0xbb);
        script.push(0x51);
        assert!(split_coinstake_script(&script).is_none());
    }

    #[test]
    fn split_skips_nested_conditionals() {
        let mut inner = vec![OP_IF, 0x51, OP_ELSE, 0x52, OP_ENDIF];
        let mut script = vec![OP_ISCOINSTAKE, OP_IF];
        script.append(&mut inner);
        script.push(OP_ELSE);
        script.extend_from_slice(&p2pkh(0xbb));
        script.push(OP_ENDIF);

        let (stake, spend) = split_coinstake_script(&script).expect("split");
        assert_eq!(stake, vec![OP_IF, 0x51, OP_ELSE, 0x52, OP_ENDIF]);
        assert_eq!(spend, p2pkh(0xbb));
    }
}
