//! Lowering of formulas to straight-line kernels.
//!
//! A [`KernelIr`] keeps one register per graph node, so node ids reported
//! to observers are identical for interpreted and compiled execution.

use std::fmt;

use curve::{BinaryOp, FieldBackend, Formula, Limbs, MontgomeryField, Node, UnaryOp};

use crate::error::CodegenError;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Instr {
    /// Reads input slot.
    Load(u16),
    Const(u64),
    Add(u32, u32),
    Sub(u32, u32),
    Mul(u32, u32),
    Sqr(u32),
    Neg(u32),
    Inv(u32),
}

/// Straight-line program for one formula. Instruction `i` writes register `i`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KernelIr {
    pub name: String,
    pub slots: usize,
    pub code: Vec<Instr>,
    pub outputs: Vec<u32>,
}

impl KernelIr {
    pub fn lower(formula: &Formula) -> Self {
        let code = formula
            .graph()
            .nodes()
            .iter()
            .map(|node| match *node {
                Node::Input(slot) => Instr::Load(slot),
                Node::Constant(c) => Instr::Const(c),
                Node::Binary(BinaryOp::Add, a, b) => Instr::Add(a.0, b.0),
                Node::Binary(BinaryOp::Sub, a, b) => Instr::Sub(a.0, b.0),
                Node::Binary(BinaryOp::Mul, a, b) => Instr::Mul(a.0, b.0),
                Node::Unary(UnaryOp::Sqr, a) => Instr::Sqr(a.0),
                Node::Unary(UnaryOp::Neg, a) => Instr::Neg(a.0),
                Node::Unary(UnaryOp::Inv, a) => Instr::Inv(a.0),
            })
            .collect();
        Self {
            name: formula.name().to_string(),
            slots: formula.inputs().len(),
            code,
            outputs: formula.outputs().iter().map(|id| id.0).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

impl fmt::Display for KernelIr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "kernel {} ({} slots)", self.name, self.slots)?;
        for (i, instr) in self.code.iter().enumerate() {
            match instr {
                Instr::Load(s) => writeln!(f, "  r{i} = slot{s}")?,
                Instr::Const(c) => writeln!(f, "  r{i} = {c}")?,
                Instr::Add(a, b) => writeln!(f, "  r{i} = r{a} + r{b}")?,
                Instr::Sub(a, b) => writeln!(f, "  r{i} = r{a} - r{b}")?,
                Instr::Mul(a, b) => writeln!(f, "  r{i} = r{a} * r{b}")?,
                Instr::Sqr(a) => writeln!(f, "  r{i} = r{a}^2")?,
                Instr::Neg(a) => writeln!(f, "  r{i} = -r{a}")?,
                Instr::Inv(a) => writeln!(f, "  r{i} = 1/r{a}")?,
            }
        }
        let outputs: Vec<String> = self.outputs.iter().map(|r| format!("r{r}")).collect();
        write!(f, "  return {}", outputs.join(", "))
    }
}

/// A compiled formula operating on Montgomery-form limbs.
pub trait Kernel: Send + Sync {
    /// Runs the kernel; afterwards `regs[i]` holds register `i`.
    fn call(&self, slots: &[Limbs], regs: &mut Vec<Limbs>);
}

/// Turns kernel IR into callable kernels.
pub trait CodegenBackend: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn compile(&self, ir: &KernelIr, field: &MontgomeryField) -> Result<Box<dyn Kernel>, CodegenError>;
}

/// Runs kernels directly on 4x64-bit Montgomery limbs.
#[derive(Clone, Debug)]
pub struct LimbBackend {
    max_instructions: usize,
}

impl LimbBackend {
    pub const NAME: &'static str = "limbs";

    pub fn new(max_instructions: usize) -> Self {
        Self { max_instructions }
    }
}

impl Default for LimbBackend {
    fn default() -> Self {
        Self::new(4096)
    }
}

impl CodegenBackend for LimbBackend {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn compile(&self, ir: &KernelIr, field: &MontgomeryField) -> Result<Box<dyn Kernel>, CodegenError> {
        if ir.len() > self.max_instructions {
            return Err(CodegenError::TooLarge {
                formula: ir.name.clone(),
                instructions: ir.len(),
                limit: self.max_instructions,
            });
        }
        let code = ir
            .code
            .iter()
            .map(|instr| match *instr {
                Instr::Load(s) => LimbInstr::Load(s as usize),
                Instr::Const(c) => LimbInstr::Const(field.from_u64(c)),
                Instr::Add(a, b) => LimbInstr::Add(a as usize, b as usize),
                Instr::Sub(a, b) => LimbInstr::Sub(a as usize, b as usize),
                Instr::Mul(a, b) => LimbInstr::Mul(a as usize, b as usize),
                Instr::Sqr(a) => LimbInstr::Mul(a as usize, a as usize),
                Instr::Neg(a) => LimbInstr::Neg(a as usize),
                Instr::Inv(a) => LimbInstr::Inv(a as usize),
            })
            .collect();
        Ok(Box::new(LimbKernel {
            field: field.clone(),
            code,
        }))
    }
}

// Instr with register indices widened and constants already in Montgomery form
enum LimbInstr {
    Load(usize),
    Const(Limbs),
    Add(usize, usize),
    Sub(usize, usize),
    Mul(usize, usize),
    Neg(usize),
    Inv(usize),
}

struct LimbKernel {
    field: MontgomeryField,
    code: Vec<LimbInstr>,
}

impl Kernel for LimbKernel {
    fn call(&self, slots: &[Limbs], regs: &mut Vec<Limbs>) {
        let f = &self.field;
        regs.clear();
        regs.reserve(self.code.len());
        for instr in &self.code {
            let value = match *instr {
                LimbInstr::Load(s) => slots[s],
                LimbInstr::Const(c) => c,
                LimbInstr::Add(a, b) => f.add_limbs(&regs[a], &regs[b]),
                LimbInstr::Sub(a, b) => f.sub_limbs(&regs[a], &regs[b]),
                LimbInstr::Mul(a, b) => f.mul_limbs(&regs[a], &regs[b]),
                LimbInstr::Neg(a) => f.neg_limbs(&regs[a]),
                LimbInstr::Inv(a) => f.inv_limbs(&regs[a]),
            };
            regs.push(value);
        }
    }
}

/// A backend that never compiles, e.g. for hosts without code generation.
#[derive(Copy, Clone, Debug, Default)]
pub struct DisabledBackend;

impl CodegenBackend for DisabledBackend {
    fn name(&self) -> &'static str {
        "disabled"
    }

    fn compile(&self, _ir: &KernelIr, _field: &MontgomeryField) -> Result<Box<dyn Kernel>, CodegenError> {
        Err(CodegenError::Unavailable {
            backend: self.name(),
        })
    }
}
