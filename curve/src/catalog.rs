use std::sync::Arc;

use crate::coords::CoordinateSystem;
use crate::curve::CurveShape;
use crate::defs::STANDARD;
use crate::error::FormulaError;
use crate::formula::{Formula, FormulaDef, OperationKind};

/// Registry of validated formulas, keyed by operation, system and shape.
///
/// The first formula inserted for an (operation, system) pair is the default
/// returned by [`Catalog::build`].
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    formulas: Vec<Arc<Formula>>,
}

impl Catalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in formulas.
    pub fn standard() -> Result<Self, FormulaError> {
        Self::from_definitions(STANDARD)
    }

    /// Validates every definition; the first bad entry aborts the load.
    pub fn from_definitions(defs: &[FormulaDef]) -> Result<Self, FormulaError> {
        let mut catalog = Self::empty();
        for def in defs {
            catalog.insert(Formula::from_def(def)?)?;
        }
        Ok(catalog)
    }

    pub fn insert(&mut self, formula: Formula) -> Result<Arc<Formula>, FormulaError> {
        if self
            .formulas
            .iter()
            .any(|f| f.name() == formula.name() && f.system() == formula.system())
        {
            return Err(FormulaError::malformed(
                formula.name(),
                format!("already defined for {} coordinates", formula.system()),
            ));
        }
        let formula = Arc::new(formula);
        self.formulas.push(formula.clone());
        Ok(formula)
    }

    /// The default formula for `kind` in `system` on curves of `shape`.
    pub fn build(
        &self,
        kind: OperationKind,
        system: CoordinateSystem,
        shape: CurveShape,
    ) -> Result<Arc<Formula>, FormulaError> {
        self.formulas(kind, system, shape)
            .next()
            .cloned()
            .ok_or(FormulaError::UnsupportedCombination {
                kind,
                system,
                shape,
            })
    }

    /// A specific formula by name.
    pub fn named(
        &self,
        name: &str,
        system: CoordinateSystem,
        shape: CurveShape,
    ) -> Result<Arc<Formula>, FormulaError> {
        self.formulas
            .iter()
            .find(|f| f.name() == name && f.system() == system && f.shape() == shape)
            .cloned()
            .ok_or_else(|| FormulaError::UnknownFormula {
                name: name.to_string(),
                system,
            })
    }

    pub fn formulas(
        &self,
        kind: OperationKind,
        system: CoordinateSystem,
        shape: CurveShape,
    ) -> impl Iterator<Item = &Arc<Formula>> {
        self.formulas
            .iter()
            .filter(move |f| f.kind() == kind && f.system() == system && f.shape() == shape)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Formula>> {
        self.formulas.iter()
    }

    pub fn len(&self) -> usize {
        self.formulas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formulas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CoordinateSystem::*;
    use CurveShape::*;
    use OperationKind::*;

    #[test]
    fn test_standard_catalog_loads() {
        let catalog = Catalog::standard().unwrap();
        assert_eq!(catalog.len(), STANDARD.len());
        assert_eq!(catalog.formulas(Add, Jacobian, ShortWeierstrass).count(), 2);
    }

    #[test]
    fn test_defaults() {
        let catalog = Catalog::standard().unwrap();
        let add = catalog.build(Add, Projective, ShortWeierstrass).unwrap();
        assert_eq!(add.name(), "add-2015-rcb");
        let dbl = catalog.build(Double, Jacobian, ShortWeierstrass).unwrap();
        assert_eq!(dbl.name(), "dbl-2007-bl");
        let ladd = catalog.build(LadderStep, Xz, Montgomery).unwrap();
        assert_eq!(ladd.num_outputs(), 2);
    }

    #[test]
    fn test_unsupported_combination() {
        let catalog = Catalog::standard().unwrap();
        assert_eq!(
            catalog.build(LadderStep, Projective, ShortWeierstrass),
            Err(FormulaError::UnsupportedCombination {
                kind: LadderStep,
                system: Projective,
                shape: ShortWeierstrass,
            })
        );
        assert!(catalog.build(Add, Xz, Montgomery).is_err());
        assert!(catalog.build(Add, Projective, TwistedEdwards).is_err());
    }

    #[test]
    fn test_named() {
        let catalog = Catalog::standard().unwrap();
        let dbl = catalog.named("dbl-2001-b", Jacobian, ShortWeierstrass).unwrap();
        assert_eq!(dbl.kind(), Double);
        assert!(matches!(
            catalog.named("dbl-2001-b", Projective, ShortWeierstrass),
            Err(FormulaError::UnknownFormula { .. })
        ));
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut catalog = Catalog::standard().unwrap();
        let again = Formula::from_def(&STANDARD[0]).unwrap();
        assert!(matches!(
            catalog.insert(again),
            Err(FormulaError::MalformedFormula { .. })
        ));
    }

    #[test]
    fn test_bad_entry_aborts_load() {
        let mut defs = STANDARD.to_vec();
        defs.insert(
            1,
            FormulaDef {
                name: "broken",
                code: "X3 = X1*nowhere",
                ..STANDARD[4]
            },
        );
        let err = Catalog::from_definitions(&defs).unwrap_err();
        assert!(matches!(err, FormulaError::MalformedFormula { ref name, .. } if name == "broken"));
    }

    #[test]
    fn test_custom_catalog() {
        let mut catalog = Catalog::empty();
        assert!(catalog.is_empty());
        let neg = catalog.insert(Formula::from_def(&STANDARD[4]).unwrap()).unwrap();
        assert_eq!(catalog.build(Negate, Projective, ShortWeierstrass).unwrap(), neg);
    }
}
