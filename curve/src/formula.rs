use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::code::{parse_line, parse_program, CodeOp, Expr, Operand};
use crate::coords::CoordinateSystem;
use crate::curve::{CurveModel, CurveShape};
use crate::error::FormulaError;
use crate::expr::{ExprGraph, NodeId, OpCounts};
use crate::field::Mod;

/// Group operation a formula implements.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    /// P1 + P2
    Add,
    /// 2 * P1
    Double,
    /// -P1
    Negate,
    /// Normalizes P1 to Z = 1
    Scale,
    /// P2 + P3 given the difference P1 = P3 - P2
    DifferentialAdd,
    /// (2 * P2, P2 + P3) given the difference P1 = P3 - P2
    LadderStep,
}

impl OperationKind {
    /// Number of (input, output) points.
    pub fn arity(&self) -> (usize, usize) {
        match self {
            OperationKind::Add => (2, 1),
            OperationKind::Double | OperationKind::Negate | OperationKind::Scale => (1, 1),
            OperationKind::DifferentialAdd => (3, 1),
            OperationKind::LadderStep => (3, 2),
        }
    }

    pub fn shortname(&self) -> &'static str {
        match self {
            OperationKind::Add => "add",
            OperationKind::Double => "dbl",
            OperationKind::Negate => "neg",
            OperationKind::Scale => "scl",
            OperationKind::DifferentialAdd => "dadd",
            OperationKind::LadderStep => "ladd",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.shortname())
    }
}

/// What an input slot of the formula graph is bound to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormulaInput {
    /// Coordinate `index` (into the system's variables) of input point `point`.
    Coordinate { point: u8, index: u8 },
    /// A curve parameter or a derived parameter.
    Parameter(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Assumption {
    /// Curve parameter has a fixed small value, checked when composing.
    ParameterEquals { parameter: String, value: i64 },
    /// Coordinate of an input point equals one, checked at evaluation.
    CoordinateIsOne { point: u8, index: u8, variable: String },
    /// Input point is not the neutral element, checked at evaluation.
    NonNeutral { point: u8 },
}

impl fmt::Display for Assumption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Assumption::ParameterEquals { parameter, value } => write!(f, "{parameter} = {value}"),
            Assumption::CoordinateIsOne { variable, .. } => write!(f, "{variable} = 1"),
            Assumption::NonNeutral { point } => write!(f, "P{} != O", point + 1),
        }
    }
}

/// Static form of an [`Assumption`] used by formula definitions.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AssumptionDef {
    ParameterEquals(&'static str, i64),
    CoordinateIsOne(&'static str),
    NonNeutral(u8),
}

/// Textual formula definition, validated by [`Formula::from_def`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FormulaDef {
    pub name: &'static str,
    pub kind: OperationKind,
    pub system: CoordinateSystem,
    /// Declared number of input points.
    pub points: usize,
    pub source: &'static str,
    /// Derived parameters, one operation per line.
    pub parameters: &'static str,
    pub assumptions: &'static [AssumptionDef],
    pub unified: bool,
    pub complete: bool,
    /// Three-address operations, one per line.
    pub code: &'static str,
}

/// A validated point-arithmetic formula.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Formula {
    name: String,
    kind: OperationKind,
    system: CoordinateSystem,
    source: String,
    inputs: Vec<FormulaInput>,
    graph: ExprGraph,
    outputs: Vec<NodeId>,
    parameters: Vec<CodeOp>,
    assumptions: Vec<Assumption>,
    unified: bool,
    complete: bool,
}

impl Formula {
    pub fn from_def(def: &FormulaDef) -> Result<Self, FormulaError> {
        let name = def.name;
        let (points, outputs) = def.kind.arity();
        if def.points != points {
            return Err(FormulaError::ArityMismatch {
                name: name.to_string(),
                kind: def.kind,
                expected: points,
                found: def.points,
            });
        }

        let system = def.system;
        let mut known: Vec<String> = system
            .shape()
            .parameter_names()
            .iter()
            .map(|p| p.to_string())
            .collect();
        let parameters =
            parse_program(def.parameters).map_err(|reason| FormulaError::malformed(name, reason))?;
        for op in &parameters {
            for operand in op.expr.operands() {
                if let Operand::Name(n) = operand {
                    if !known.contains(n) {
                        return Err(FormulaError::malformed(
                            name,
                            format!("parameter program uses unknown name `{n}`"),
                        ));
                    }
                }
            }
            if known.contains(&op.result) {
                return Err(FormulaError::malformed(
                    name,
                    format!("parameter `{}` is defined twice", op.result),
                ));
            }
            known.push(op.result.clone());
        }

        let mut builder = Builder {
            name,
            system,
            points,
            parameters: &known,
            graph: ExprGraph::new(),
            inputs: Vec::new(),
            env: HashMap::new(),
            constants: HashMap::new(),
        };
        let mut lines = 0;
        for line in def.code.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let op = parse_line(line).map_err(|reason| FormulaError::malformed(name, reason))?;
            builder.assign(&op)?;
            lines += 1;
        }
        if lines == 0 {
            return Err(FormulaError::malformed(name, "formula has no operations"));
        }

        let first_output = (points + 1).max(3);
        let mut output_nodes = Vec::with_capacity(outputs * system.dimension());
        for i in 0..outputs {
            for variable in system.variables() {
                let output = format!("{variable}{}", first_output + i);
                let node = builder.env.get(&output).copied().ok_or_else(|| {
                    FormulaError::malformed(name, format!("output `{output}` is never assigned"))
                })?;
                output_nodes.push(node);
            }
        }

        let assumptions = def
            .assumptions
            .iter()
            .map(|assumption| builder.assumption(assumption))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: name.to_string(),
            kind: def.kind,
            system,
            source: def.source.to_string(),
            inputs: builder.inputs,
            graph: builder.graph,
            outputs: output_nodes,
            parameters,
            assumptions,
            unified: def.unified,
            complete: def.complete,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn system(&self) -> CoordinateSystem {
        self.system
    }

    pub fn shape(&self) -> CurveShape {
        self.system.shape()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn inputs(&self) -> &[FormulaInput] {
        &self.inputs
    }

    pub fn graph(&self) -> &ExprGraph {
        &self.graph
    }

    /// Output nodes, point-major in the system's variable order.
    pub fn outputs(&self) -> &[NodeId] {
        &self.outputs
    }

    pub fn num_inputs(&self) -> usize {
        self.kind.arity().0
    }

    pub fn num_outputs(&self) -> usize {
        self.kind.arity().1
    }

    pub fn parameter_program(&self) -> &[CodeOp] {
        &self.parameters
    }

    pub fn assumptions(&self) -> &[Assumption] {
        &self.assumptions
    }

    /// Whether the formula also computes doublings correctly.
    pub fn is_unified(&self) -> bool {
        self.unified
    }

    /// Whether the formula is correct for all inputs, the neutral point included.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn op_counts(&self) -> OpCounts {
        self.graph.op_counts()
    }

    /// For every node, the bitmask of input points it depends on.
    pub fn point_masks(&self) -> Vec<u64> {
        self.graph
            .dependency_masks(|slot| match &self.inputs[slot as usize] {
                FormulaInput::Coordinate { point, .. } => Some(*point as u32),
                FormulaInput::Parameter(_) => None,
            })
    }

    /// Checks curve-parameter assumptions and evaluates the derived
    /// parameters on `curve`. Returns, per input slot, the bound parameter
    /// value or `None` for coordinate slots.
    pub fn bind_parameters(&self, curve: &CurveModel) -> Result<Vec<Option<Mod>>, FormulaError> {
        for assumption in &self.assumptions {
            if let Assumption::ParameterEquals { parameter, value } = assumption {
                let expected = Mod::from_i64(*value, curve.modulus());
                if curve.parameter(parameter) != Some(&expected) {
                    return Err(FormulaError::UnsatisfiedAssumption {
                        name: self.name.clone(),
                        assumption: assumption.to_string(),
                        curve: curve.name().to_string(),
                    });
                }
            }
        }

        let mut env: BTreeMap<String, Mod> = curve.parameters().clone();
        for op in &self.parameters {
            let value = evaluate_constant(&op.expr, &env, curve).ok_or_else(|| {
                FormulaError::malformed(&self.name, format!("cannot evaluate `{op}` on {}", curve.name()))
            })?;
            env.insert(op.result.clone(), value);
        }

        self.inputs
            .iter()
            .map(|input| match input {
                FormulaInput::Coordinate { .. } => Ok(None),
                FormulaInput::Parameter(p) => env.get(p).cloned().map(Some).ok_or_else(|| {
                    FormulaError::UnsatisfiedAssumption {
                        name: self.name.clone(),
                        assumption: format!("parameter `{p}` is defined"),
                        curve: curve.name().to_string(),
                    }
                }),
            })
            .collect()
    }
}

fn evaluate_constant(expr: &Expr, env: &BTreeMap<String, Mod>, curve: &CurveModel) -> Option<Mod> {
    let value = |operand: &Operand| match operand {
        Operand::Name(n) => env.get(n).cloned(),
        Operand::Int(v) => Some(Mod::from_u64(*v, curve.modulus())),
    };
    let result = match expr {
        Expr::Copy(a) => value(a)?,
        Expr::Add(a, b) => value(a)? + value(b)?,
        Expr::Sub(a, b) => value(a)? - value(b)?,
        Expr::Mul(a, b) => value(a)? * value(b)?,
        Expr::Div(a, b) => value(a)? / value(b)?,
        Expr::Neg(a) => -value(a)?,
        Expr::Inv(a) => value(a)?.inverse(),
        Expr::Sqr(a) => value(a)?.square(),
    };
    Some(result)
}

struct Builder<'a> {
    name: &'a str,
    system: CoordinateSystem,
    points: usize,
    parameters: &'a [String],
    graph: ExprGraph,
    inputs: Vec<FormulaInput>,
    env: HashMap<String, NodeId>,
    constants: HashMap<u64, NodeId>,
}

impl Builder<'_> {
    fn assign(&mut self, op: &CodeOp) -> Result<(), FormulaError> {
        if self.coordinate(&op.result).is_some() || self.parameters.contains(&op.result) {
            return Err(FormulaError::malformed(
                self.name,
                format!("`{op}` redefines input `{}`", op.result),
            ));
        }

        let node = match &op.expr {
            Expr::Copy(a) => self.operand(a)?,
            Expr::Add(a, b) => {
                let (a, b) = (self.operand(a)?, self.operand(b)?);
                self.graph.add(a, b)
            }
            Expr::Sub(a, b) => {
                let (a, b) = (self.operand(a)?, self.operand(b)?);
                self.graph.sub(a, b)
            }
            Expr::Mul(a, b) => {
                let (a, b) = (self.operand(a)?, self.operand(b)?);
                self.graph.mul(a, b)
            }
            Expr::Div(a, b) => {
                let (a, b) = (self.operand(a)?, self.operand(b)?);
                let inverse = self.graph.inv(b);
                self.graph.mul(a, inverse)
            }
            Expr::Neg(a) => {
                let a = self.operand(a)?;
                self.graph.neg(a)
            }
            Expr::Inv(a) => {
                let a = self.operand(a)?;
                self.graph.inv(a)
            }
            Expr::Sqr(a) => {
                let a = self.operand(a)?;
                self.graph.sqr(a)
            }
        };
        self.env.insert(op.result.clone(), node);
        Ok(())
    }

    fn operand(&mut self, operand: &Operand) -> Result<NodeId, FormulaError> {
        match operand {
            Operand::Int(value) => {
                if let Some(node) = self.constants.get(value) {
                    return Ok(*node);
                }
                let node = self.graph.constant(*value);
                self.constants.insert(*value, node);
                Ok(node)
            }
            Operand::Name(name) => {
                if let Some(node) = self.env.get(name) {
                    return Ok(*node);
                }
                let input = if let Some((point, index)) = self.coordinate(name) {
                    FormulaInput::Coordinate { point, index }
                } else if self.parameters.contains(name) {
                    FormulaInput::Parameter(name.clone())
                } else {
                    return Err(FormulaError::malformed(
                        self.name,
                        format!("`{name}` is used before it is defined"),
                    ));
                };
                let node = self.graph.input(self.inputs.len() as u16);
                self.inputs.push(input);
                self.env.insert(name.clone(), node);
                Ok(node)
            }
        }
    }

    /// Resolves `X2` style names to (point, coordinate index), both zero based.
    fn coordinate(&self, name: &str) -> Option<(u8, u8)> {
        let split = name.find(|c: char| c.is_ascii_digit())?;
        let (variable, number) = name.split_at(split);
        let number: usize = number.parse().ok()?;
        if number == 0 || number > self.points {
            return None;
        }
        let index = self.system.variable_index(variable)?;
        Some(((number - 1) as u8, index as u8))
    }

    fn assumption(&self, def: &AssumptionDef) -> Result<Assumption, FormulaError> {
        match *def {
            AssumptionDef::ParameterEquals(parameter, value) => {
                if !self.system.shape().parameter_names().contains(&parameter) {
                    return Err(FormulaError::malformed(
                        self.name,
                        format!("assumption on unknown parameter `{parameter}`"),
                    ));
                }
                Ok(Assumption::ParameterEquals {
                    parameter: parameter.to_string(),
                    value,
                })
            }
            AssumptionDef::CoordinateIsOne(variable) => {
                let (point, index) = self.coordinate(variable).ok_or_else(|| {
                    FormulaError::malformed(
                        self.name,
                        format!("assumption on unknown coordinate `{variable}`"),
                    )
                })?;
                Ok(Assumption::CoordinateIsOne {
                    point,
                    index,
                    variable: variable.to_string(),
                })
            }
            AssumptionDef::NonNeutral(point) => {
                if point == 0 || point as usize > self.points {
                    return Err(FormulaError::malformed(
                        self.name,
                        format!("assumption on unknown point P{point}"),
                    ));
                }
                Ok(Assumption::NonNeutral { point: point - 1 })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defs::STANDARD;

    const DOUBLE: FormulaDef = FormulaDef {
        name: "dbl-test",
        kind: OperationKind::Double,
        system: CoordinateSystem::Projective,
        points: 1,
        source: "test",
        parameters: "",
        assumptions: &[],
        unified: false,
        complete: false,
        code: "X3 = X1^2\nY3 = Y1+Y1\nZ3 = Z1",
    };

    fn standard(name: &str, system: CoordinateSystem) -> Formula {
        let def = STANDARD
            .iter()
            .find(|d| d.name == name && d.system == system)
            .unwrap();
        Formula::from_def(def).unwrap()
    }

    #[test]
    fn test_build_simple() {
        let formula = Formula::from_def(&DOUBLE).unwrap();
        assert_eq!(formula.inputs().len(), 3);
        assert_eq!(formula.outputs().len(), 3);
        // Z3 aliases the input node
        assert_eq!(formula.outputs()[2], NodeId(4));
        assert_eq!(formula.op_counts().total(), 2);
    }

    #[test]
    fn test_arity_mismatch() {
        let def = FormulaDef { points: 2, ..DOUBLE };
        assert_eq!(
            Formula::from_def(&def),
            Err(FormulaError::ArityMismatch {
                name: "dbl-test".to_string(),
                kind: OperationKind::Double,
                expected: 1,
                found: 2,
            })
        );
    }

    #[test]
    fn test_missing_output() {
        let def = FormulaDef {
            code: "X3 = X1^2\nY3 = Y1",
            ..DOUBLE
        };
        let err = Formula::from_def(&def).unwrap_err();
        assert!(matches!(err, FormulaError::MalformedFormula { ref reason, .. } if reason.contains("Z3")));
    }

    #[test]
    fn test_undefined_name() {
        let def = FormulaDef {
            code: "X3 = X1*t9\nY3 = Y1\nZ3 = Z1",
            ..DOUBLE
        };
        assert!(matches!(
            Formula::from_def(&def),
            Err(FormulaError::MalformedFormula { .. })
        ));
    }

    #[test]
    fn test_input_redefinition() {
        let def = FormulaDef {
            code: "X1 = Y1\nX3 = X1\nY3 = Y1\nZ3 = Z1",
            ..DOUBLE
        };
        assert!(matches!(
            Formula::from_def(&def),
            Err(FormulaError::MalformedFormula { .. })
        ));
    }

    #[test]
    fn test_empty_code() {
        let def = FormulaDef { code: "\n", ..DOUBLE };
        assert!(Formula::from_def(&def).is_err());
    }

    #[test]
    fn test_division_lowers_to_inverse() {
        let def = FormulaDef {
            code: "X3 = X1/Z1\nY3 = Y1/Z1\nZ3 = 1",
            ..DOUBLE
        };
        let counts = Formula::from_def(&def).unwrap().op_counts();
        assert_eq!(counts.inversions, 2);
        assert_eq!(counts.multiplications, 2);
    }

    #[test]
    fn test_rcb_op_counts() {
        let add = standard("add-2015-rcb", CoordinateSystem::Projective);
        assert_eq!(add.op_counts().multiplications, 17);
        assert_eq!(add.op_counts().additions, 23);
        assert!(add.is_complete());

        let dbl = standard("dbl-2015-rcb", CoordinateSystem::Projective);
        assert_eq!(dbl.op_counts().multiplications, 13);
        assert_eq!(dbl.op_counts().squarings, 3);
    }

    #[test]
    fn test_ladder_outputs() {
        let ladd = standard("ladd-1987-m", CoordinateSystem::Xz);
        assert_eq!(ladd.num_outputs(), 2);
        assert_eq!(ladd.outputs().len(), 4);
        assert!(ladd
            .inputs()
            .contains(&FormulaInput::Parameter("a24".to_string())));
    }

    #[test]
    fn test_point_masks() {
        let add = standard("add-2007-bl", CoordinateSystem::Jacobian);
        let masks = add.point_masks();
        assert_eq!(masks[add.graph().len() - 1] & 0b11, 0b11);
        // Z1Z1 = Z1^2 depends on the first point only
        assert!(masks.iter().any(|m| *m == 0b01));
        assert!(masks.iter().any(|m| *m == 0b10));
    }

    #[test]
    fn test_bind_parameters() {
        let curve = CurveModel::secp256k1();
        let add = standard("add-2015-rcb", CoordinateSystem::Projective);
        let bound = add.bind_parameters(&curve).unwrap();
        let b3 = add
            .inputs()
            .iter()
            .position(|i| *i == FormulaInput::Parameter("b3".to_string()))
            .unwrap();
        assert_eq!(bound[b3], Some(curve.element(21u32)));
        assert!(bound
            .iter()
            .zip(add.inputs())
            .all(|(b, i)| b.is_some() == matches!(i, FormulaInput::Parameter(_))));
    }

    #[test]
    fn test_parameter_assumption() {
        let dbl = standard("dbl-2001-b", CoordinateSystem::Jacobian);
        assert!(dbl.bind_parameters(&CurveModel::secp256r1()).is_ok());
        assert!(matches!(
            dbl.bind_parameters(&CurveModel::secp256k1()),
            Err(FormulaError::UnsatisfiedAssumption { .. })
        ));
    }

    #[test]
    fn test_assumption_display() {
        let madd = standard("madd-2007-bl", CoordinateSystem::Jacobian);
        assert_eq!(madd.assumptions()[0].to_string(), "Z2 = 1");
    }
}
