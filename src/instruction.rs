use crate::error::{Chip8Error, Result};
use crate::state::{Address, Quirks, Register};

/// The operand fields of a raw opcode. Every field is extracted from the
/// same bit positions regardless of which instruction the opcode encodes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DecodedInstruction {
    /// First nibble. Selects the instruction family.
    pub opcode: u8,
    /// Second nibble. Used to look up one of the 16 registers.
    pub x: Register,
    /// Third nibble. Used to look up one of the 16 registers.
    pub y: Register,
    /// Fourth nibble. A 4-bit number.
    pub n: u8,
    /// The second byte (third and fourth nibbles). An 8-bit immediate number.
    pub nn: u8,
    /// The second, third, and fourth nibbles. A 12-bit immediate address.
    pub nnn: Address,
}

impl DecodedInstruction {
    pub fn new(raw: u16) -> Self {
        DecodedInstruction {
            opcode: (raw >> 12) as u8,
            x: Register::from_nibble((raw >> 8) as u8),
            y: Register::from_nibble((raw >> 4) as u8),
            n: (raw & 0x0F) as u8,
            nn: (raw & 0x00FF) as u8,
            nnn: raw & 0x0FFF,
        }
    }
}

/// Register-to-register operations of the 8xyN family.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AluOp {
    Assign,
    Or,
    And,
    Xor,
    Add,
    Sub,
    ShiftRight,
    SubN,
    ShiftLeft,
}

/// Result of an ALU operation: the value destined for Vx and, separately,
/// the value destined for VF if the operation produces a flag.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AluResult {
    pub value: u8,
    pub flag: Option<bool>,
}

impl AluOp {
    fn from_nibble(n: u8) -> Option<Self> {
        match n {
            0x0 => Some(AluOp::Assign),
            0x1 => Some(AluOp::Or),
            0x2 => Some(AluOp::And),
            0x3 => Some(AluOp::Xor),
            0x4 => Some(AluOp::Add),
            0x5 => Some(AluOp::Sub),
            0x6 => Some(AluOp::ShiftRight),
            0x7 => Some(AluOp::SubN),
            0xE => Some(AluOp::ShiftLeft),
            _ => None,
        }
    }

    /// Compute the operation on the pre-instruction values of Vx and Vy.
    pub fn apply(self, vx: u8, vy: u8, quirks: &Quirks) -> AluResult {
        let logic_flag = quirks.logic_resets_vf.then_some(false);
        let shift_source = if quirks.shift_uses_vy { vy } else { vx };

        match self {
            AluOp::Assign => AluResult {
                value: vy,
                flag: None,
            },
            AluOp::Or => AluResult {
                value: vx | vy,
                flag: logic_flag,
            },
            AluOp::And => AluResult {
                value: vx & vy,
                flag: logic_flag,
            },
            AluOp::Xor => AluResult {
                value: vx ^ vy,
                flag: logic_flag,
            },
            AluOp::Add => {
                let (value, carry) = vx.overflowing_add(vy);
                AluResult {
                    value,
                    flag: Some(carry),
                }
            }
            AluOp::Sub => AluResult {
                value: vx.wrapping_sub(vy),
                flag: Some(vx > vy),
            },
            AluOp::SubN => AluResult {
                value: vy.wrapping_sub(vx),
                flag: Some(vy > vx),
            },
            AluOp::ShiftRight => AluResult {
                value: shift_source >> 1,
                flag: Some(shift_source & 0x01 == 1),
            },
            AluOp::ShiftLeft => AluResult {
                value: shift_source << 1,
                flag: Some(shift_source & 0x80 != 0),
            },
        }
    }
}

/// One decoded CHIP-8 instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    /// 00E0
    ClearScreen,
    /// 00EE
    Return,
    /// 1nnn
    Jump(Address),
    /// 2nnn
    Call(Address),
    /// 3xkk
    SkipEqImmediate(Register, u8),
    /// 4xkk
    SkipNeqImmediate(Register, u8),
    /// 5xy0
    SkipEqRegister(Register, Register),
    /// 9xy0
    SkipNeqRegister(Register, Register),
    /// 6xkk
    SetImmediate(Register, u8),
    /// 7xkk, wraps without touching VF.
    AddImmediate(Register, u8),
    /// 8xyN
    Alu(AluOp, Register, Register),
    /// Annn
    SetIndex(Address),
    /// Bnnn, PC := V0 + nnn.
    JumpWithOffset(Address),
    /// Cxkk
    Random(Register, u8),
    /// Dxyn
    Draw(Register, Register, u8),
    /// Ex9E
    SkipIfKeyPressed(Register),
    /// ExA1
    SkipIfKeyNotPressed(Register),
    /// Fx07
    ReadDelayTimer(Register),
    /// Fx0A
    WaitForKey(Register),
    /// Fx15
    SetDelayTimer(Register),
    /// Fx18
    SetSoundTimer(Register),
    /// Fx1E
    AddToIndex(Register),
    /// Fx29
    FontChar(Register),
    /// Fx33
    BinaryCodedDecimal(Register),
    /// Fx55
    StoreRegisters(Register),
    /// Fx65
    LoadRegisters(Register),
}

impl Instruction {
    /// Decode a raw opcode. `pc` is the opcode's address and only feeds the
    /// error for opcodes outside the instruction set.
    pub fn decode(raw: u16, pc: Address) -> Result<Self> {
        let d = DecodedInstruction::new(raw);
        let unknown = Chip8Error::UnknownOpcode { opcode: raw, pc };

        let instruction = match d.opcode {
            0x0 => match d.nnn {
                0x0E0 => Instruction::ClearScreen,
                0x0EE => Instruction::Return,
                _ => return Err(unknown),
            },
            0x1 => Instruction::Jump(d.nnn),
            0x2 => Instruction::Call(d.nnn),
            0x3 => Instruction::SkipEqImmediate(d.x, d.nn),
            0x4 => Instruction::SkipNeqImmediate(d.x, d.nn),
            0x5 if d.n == 0 => Instruction::SkipEqRegister(d.x, d.y),
            0x6 => Instruction::SetImmediate(d.x, d.nn),
            0x7 => Instruction::AddImmediate(d.x, d.nn),
            0x8 => match AluOp::from_nibble(d.n) {
                Some(op) => Instruction::Alu(op, d.x, d.y),
                None => return Err(unknown),
            },
            0x9 if d.n == 0 => Instruction::SkipNeqRegister(d.x, d.y),
            0xA => Instruction::SetIndex(d.nnn),
            0xB => Instruction::JumpWithOffset(d.nnn),
            0xC => Instruction::Random(d.x, d.nn),
            0xD => Instruction::Draw(d.x, d.y, d.n),
            0xE => match d.nn {
                0x9E => Instruction::SkipIfKeyPressed(d.x),
                0xA1 => Instruction::SkipIfKeyNotPressed(d.x),
                _ => return Err(unknown),
            },
            0xF => match d.nn {
                0x07 => Instruction::ReadDelayTimer(d.x),
                0x0A => Instruction::WaitForKey(d.x),
                0x15 => Instruction::SetDelayTimer(d.x),
                0x18 => Instruction::SetSoundTimer(d.x),
                0x1E => Instruction::AddToIndex(d.x),
                0x29 => Instruction::FontChar(d.x),
                0x33 => Instruction::BinaryCodedDecimal(d.x),
                0x55 => Instruction::StoreRegisters(d.x),
                0x65 => Instruction::LoadRegisters(d.x),
                _ => return Err(unknown),
            },
            _ => return Err(unknown),
        };
        Ok(instruction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(raw: u16) -> Instruction {
        Instruction::decode(raw, 0x200).unwrap()
    }

    #[test]
    fn test_fields() {
        let d = DecodedInstruction::new(0xABCD);
        assert_eq!(d.opcode, 0xA);
        assert_eq!(d.x, Register::VB);
        assert_eq!(d.y, Register::VC);
        assert_eq!(d.n, 0xD);
        assert_eq!(d.nn, 0xCD);
        assert_eq!(d.nnn, 0xBCD);
    }

    #[test]
    fn test_decode_families() {
        assert_eq!(decode(0x00E0), Instruction::ClearScreen);
        assert_eq!(decode(0x00EE), Instruction::Return);
        assert_eq!(decode(0x1234), Instruction::Jump(0x234));
        assert_eq!(decode(0x2ABC), Instruction::Call(0xABC));
        assert_eq!(
            decode(0x3A12),
            Instruction::SkipEqImmediate(Register::VA, 0x12)
        );
        assert_eq!(
            decode(0x5120),
            Instruction::SkipEqRegister(Register::V1, Register::V2)
        );
        assert_eq!(
            decode(0x8124),
            Instruction::Alu(AluOp::Add, Register::V1, Register::V2)
        );
        assert_eq!(
            decode(0x8FFE),
            Instruction::Alu(AluOp::ShiftLeft, Register::VF, Register::VF)
        );
        assert_eq!(decode(0xD125), Instruction::Draw(Register::V1, Register::V2, 5));
        assert_eq!(decode(0xE3A1), Instruction::SkipIfKeyNotPressed(Register::V3));
        assert_eq!(decode(0xF50A), Instruction::WaitForKey(Register::V5));
        assert_eq!(decode(0xF465), Instruction::LoadRegisters(Register::V4));
    }

    #[test]
    fn test_decode_unknown() {
        for raw in [0x0123, 0x5121, 0x8128, 0x912F, 0xE1FF, 0xF1FF] {
            assert!(matches!(
                Instruction::decode(raw, 0x204),
                Err(Chip8Error::UnknownOpcode { opcode, pc: 0x204 }) if opcode == raw
            ));
        }
    }

    #[test]
    fn test_add_carry() {
        let quirks = Quirks::default();
        assert_eq!(
            AluOp::Add.apply(200, 100, &quirks),
            AluResult {
                value: 44,
                flag: Some(true)
            }
        );
        assert_eq!(
            AluOp::Add.apply(200, 55, &quirks),
            AluResult {
                value: 255,
                flag: Some(false)
            }
        );
    }

    #[test]
    fn test_sub_flags() {
        let quirks = Quirks::default();
        assert_eq!(AluOp::Sub.apply(5, 3, &quirks).flag, Some(true));
        assert_eq!(AluOp::Sub.apply(3, 5, &quirks).value, 254);
        assert_eq!(AluOp::Sub.apply(3, 3, &quirks).flag, Some(false));
        assert_eq!(AluOp::SubN.apply(3, 5, &quirks).value, 2);
        assert_eq!(AluOp::SubN.apply(3, 5, &quirks).flag, Some(true));
        assert_eq!(AluOp::SubN.apply(5, 5, &quirks).flag, Some(false));
    }

    #[test]
    fn test_shifts() {
        let quirks = Quirks::default();
        assert_eq!(
            AluOp::ShiftRight.apply(0b0000_0011, 0, &quirks),
            AluResult {
                value: 0b0000_0001,
                flag: Some(true)
            }
        );
        assert_eq!(
            AluOp::ShiftLeft.apply(0b1000_0001, 0, &quirks),
            AluResult {
                value: 0b0000_0010,
                flag: Some(true)
            }
        );

        let vy_quirks = Quirks {
            shift_uses_vy: true,
            ..Quirks::default()
        };
        assert_eq!(AluOp::ShiftRight.apply(0xFF, 0x04, &vy_quirks).value, 0x02);
    }

    #[test]
    fn test_logic_flag_quirk() {
        assert_eq!(AluOp::Or.apply(1, 2, &Quirks::default()).flag, None);
        let quirks = Quirks {
            logic_resets_vf: true,
            ..Quirks::default()
        };
        assert_eq!(
            AluOp::Xor.apply(0xF0, 0xFF, &quirks),
            AluResult {
                value: 0x0F,
                flag: Some(false)
            }
        );
    }
}
