//! Built-in formula definitions.
//!
//! Sources follow the Explicit-Formulas Database naming; the complete short
//! Weierstrass formulas are Renes-Costello-Batina (eprint 2015/1060).

use crate::coords::CoordinateSystem::{Extended, Jacobian, Projective, Xz};
use crate::formula::AssumptionDef;
use crate::formula::FormulaDef;
use crate::formula::OperationKind::{Add, DifferentialAdd, Double, LadderStep, Negate, Scale};

pub static STANDARD: &[FormulaDef] = &[
    FormulaDef {
        name: "add-2015-rcb",
        kind: Add,
        system: Projective,
        points: 2,
        source: "eprint 2015/1060, algorithm 1",
        parameters: "b3 = 3*b",
        assumptions: &[],
        unified: true,
        complete: true,
        code: "
            t0 = X1*X2
            t1 = Y1*Y2
            t2 = Z1*Z2
            t3 = X1+Y1
            t4 = X2+Y2
            t3 = t3*t4
            t4 = t0+t1
            t3 = t3-t4
            t4 = X1+Z1
            t5 = X2+Z2
            t4 = t4*t5
            t5 = t0+t2
            t4 = t4-t5
            t5 = Y1+Z1
            X3 = Y2+Z2
            t5 = t5*X3
            X3 = t1+t2
            t5 = t5-X3
            Z3 = a*t4
            X3 = b3*t2
            Z3 = X3+Z3
            X3 = t1-Z3
            Z3 = t1+Z3
            Y3 = X3*Z3
            t1 = t0+t0
            t1 = t1+t0
            t2 = a*t2
            t4 = b3*t4
            t1 = t1+t2
            t2 = t0-t2
            t2 = a*t2
            t4 = t4+t2
            t0 = t1*t4
            Y3 = Y3+t0
            t0 = t5*t4
            X3 = t3*X3
            X3 = X3-t0
            t0 = t3*t1
            Z3 = t5*Z3
            Z3 = Z3+t0
        ",
    },
    FormulaDef {
        name: "dbl-2015-rcb",
        kind: Double,
        system: Projective,
        points: 1,
        source: "eprint 2015/1060, algorithm 3",
        parameters: "b3 = 3*b",
        assumptions: &[],
        unified: false,
        complete: true,
        code: "
            t0 = X1^2
            t1 = Y1^2
            t2 = Z1^2
            t3 = X1*Y1
            t3 = t3+t3
            Z3 = X1*Z1
            Z3 = Z3+Z3
            X3 = a*Z3
            Y3 = b3*t2
            Y3 = X3+Y3
            X3 = t1-Y3
            Y3 = t1+Y3
            Y3 = X3*Y3
            X3 = t3*X3
            Z3 = b3*Z3
            t2 = a*t2
            t3 = t0-t2
            t3 = a*t3
            t3 = t3+Z3
            Z3 = t0+t0
            t0 = Z3+t0
            t0 = t0+t2
            t0 = t0*t3
            Y3 = Y3+t0
            t2 = Y1*Z1
            t2 = t2+t2
            t0 = t2*t3
            X3 = X3-t0
            Z3 = t2*t1
            Z3 = Z3+Z3
            Z3 = Z3+Z3
        ",
    },
    FormulaDef {
        name: "add-2007-bl",
        kind: Add,
        system: Projective,
        points: 2,
        source: "efd g1p/auto/shortw/projective/addition/add-2007-bl",
        parameters: "",
        assumptions: &[AssumptionDef::NonNeutral(1), AssumptionDef::NonNeutral(2)],
        unified: true,
        complete: false,
        code: "
            U1 = X1*Z2
            U2 = X2*Z1
            S1 = Y1*Z2
            S2 = Y2*Z1
            ZZ = Z1*Z2
            T = U1+U2
            TT = T^2
            M = S1+S2
            t0 = U1*U2
            t1 = TT-t0
            t2 = ZZ^2
            t3 = a*t2
            R = t1+t3
            F = ZZ*M
            L = M*F
            LL = L^2
            t4 = T+L
            t5 = t4^2
            t6 = t5-TT
            G = t6-LL
            t7 = R^2
            t8 = 2*t7
            W = t8-G
            t9 = F*W
            X3 = 2*t9
            t10 = 2*W
            t11 = G-t10
            t12 = R*t11
            t13 = 2*LL
            Y3 = t12-t13
            t14 = F^2
            t15 = F*t14
            Z3 = 4*t15
        ",
    },
    FormulaDef {
        name: "dbl-2007-bl",
        kind: Double,
        system: Projective,
        points: 1,
        source: "efd g1p/auto/shortw/projective/doubling/dbl-2007-bl",
        parameters: "",
        assumptions: &[],
        unified: false,
        complete: false,
        code: "
            XX = X1^2
            ZZ = Z1^2
            t0 = a*ZZ
            t1 = 3*XX
            w = t0+t1
            t2 = Y1*Z1
            s = 2*t2
            ss = s^2
            sss = s*ss
            R = Y1*s
            RR = R^2
            t3 = X1+R
            t4 = t3^2
            t5 = t4-XX
            B = t5-RR
            t6 = w^2
            t7 = 2*B
            h = t6-t7
            X3 = h*s
            t8 = B-h
            t9 = w*t8
            t10 = 2*RR
            Y3 = t9-t10
            Z3 = sss
        ",
    },
    FormulaDef {
        name: "neg",
        kind: Negate,
        system: Projective,
        points: 1,
        source: "efd g1p/auto/shortw/projective/negation",
        parameters: "",
        assumptions: &[],
        unified: false,
        complete: true,
        code: "
            X3 = X1
            Y3 = -Y1
            Z3 = Z1
        ",
    },
    FormulaDef {
        name: "scale",
        kind: Scale,
        system: Projective,
        points: 1,
        source: "efd g1p/auto/shortw/projective/scaling/z",
        parameters: "",
        assumptions: &[],
        unified: false,
        complete: false,
        code: "
            A = 1/Z1
            X3 = X1*A
            Y3 = Y1*A
            Z3 = 1
        ",
    },
    FormulaDef {
        name: "add-2007-bl",
        kind: Add,
        system: Jacobian,
        points: 2,
        source: "efd g1p/auto/shortw/jacobian/addition/add-2007-bl",
        parameters: "",
        assumptions: &[AssumptionDef::NonNeutral(1), AssumptionDef::NonNeutral(2)],
        unified: false,
        complete: false,
        code: "
            Z1Z1 = Z1^2
            Z2Z2 = Z2^2
            U1 = X1*Z2Z2
            U2 = X2*Z1Z1
            t0 = Z2*Z2Z2
            S1 = Y1*t0
            t1 = Z1*Z1Z1
            S2 = Y2*t1
            H = U2-U1
            t2 = 2*H
            I = t2^2
            J = H*I
            t3 = S2-S1
            r = 2*t3
            V = U1*I
            t4 = r^2
            t5 = 2*V
            t6 = t4-J
            X3 = t6-t5
            t7 = V-X3
            t8 = S1*J
            t9 = 2*t8
            t10 = r*t7
            Y3 = t10-t9
            t11 = Z1+Z2
            t12 = t11^2
            t13 = t12-Z1Z1
            t14 = t13-Z2Z2
            Z3 = t14*H
        ",
    },
    FormulaDef {
        name: "madd-2007-bl",
        kind: Add,
        system: Jacobian,
        points: 2,
        source: "efd g1p/auto/shortw/jacobian/addition/madd-2007-bl",
        parameters: "",
        assumptions: &[AssumptionDef::CoordinateIsOne("Z2"), AssumptionDef::NonNeutral(1)],
        unified: false,
        complete: false,
        code: "
            Z1Z1 = Z1^2
            U2 = X2*Z1Z1
            t0 = Z1*Z1Z1
            S2 = Y2*t0
            H = U2-X1
            HH = H^2
            I = 4*HH
            J = H*I
            t1 = S2-Y1
            r = 2*t1
            V = X1*I
            t2 = r^2
            t3 = 2*V
            t4 = t2-J
            X3 = t4-t3
            t5 = V-X3
            t6 = Y1*J
            t7 = 2*t6
            t8 = r*t5
            Y3 = t8-t7
            t9 = Z1+H
            t10 = t9^2
            t11 = t10-Z1Z1
            Z3 = t11-HH
        ",
    },
    FormulaDef {
        name: "dbl-2007-bl",
        kind: Double,
        system: Jacobian,
        points: 1,
        source: "efd g1p/auto/shortw/jacobian/doubling/dbl-2007-bl",
        parameters: "",
        assumptions: &[],
        unified: false,
        complete: false,
        code: "
            XX = X1^2
            YY = Y1^2
            YYYY = YY^2
            ZZ = Z1^2
            t0 = X1+YY
            t1 = t0^2
            t2 = t1-XX
            t3 = t2-YYYY
            S = 2*t3
            t4 = ZZ^2
            t5 = a*t4
            t6 = 3*XX
            M = t6+t5
            t7 = M^2
            t8 = 2*S
            T = t7-t8
            X3 = T
            t9 = S-T
            t10 = 8*YYYY
            t11 = M*t9
            Y3 = t11-t10
            t12 = Y1+Z1
            t13 = t12^2
            t14 = t13-YY
            Z3 = t14-ZZ
        ",
    },
    FormulaDef {
        name: "dbl-2001-b",
        kind: Double,
        system: Jacobian,
        points: 1,
        source: "efd g1p/auto/shortw/jacobian-3/doubling/dbl-2001-b",
        parameters: "",
        assumptions: &[AssumptionDef::ParameterEquals("a", -3)],
        unified: false,
        complete: false,
        code: "
            delta = Z1^2
            gamma = Y1^2
            beta = X1*gamma
            t0 = X1-delta
            t1 = X1+delta
            t2 = t0*t1
            alpha = 3*t2
            t3 = alpha^2
            t4 = 8*beta
            X3 = t3-t4
            t5 = Y1+Z1
            t6 = t5^2
            t7 = t6-gamma
            Z3 = t7-delta
            t8 = 4*beta
            t9 = t8-X3
            t10 = gamma^2
            t11 = 8*t10
            t12 = alpha*t9
            Y3 = t12-t11
        ",
    },
    FormulaDef {
        name: "neg",
        kind: Negate,
        system: Jacobian,
        points: 1,
        source: "efd g1p/auto/shortw/jacobian/negation",
        parameters: "",
        assumptions: &[],
        unified: false,
        complete: true,
        code: "
            X3 = X1
            Y3 = -Y1
            Z3 = Z1
        ",
    },
    FormulaDef {
        name: "scale",
        kind: Scale,
        system: Jacobian,
        points: 1,
        source: "efd g1p/auto/shortw/jacobian/scaling/z",
        parameters: "",
        assumptions: &[],
        unified: false,
        complete: false,
        code: "
            A = 1/Z1
            AA = A^2
            X3 = X1*AA
            AAA = AA*A
            Y3 = Y1*AAA
            Z3 = 1
        ",
    },
    FormulaDef {
        name: "ladd-1987-m",
        kind: LadderStep,
        system: Xz,
        points: 3,
        source: "efd g1p/auto/montgom/xz/ladder/ladd-1987-m",
        parameters: "
            a2 = a+2
            a24 = a2/4
        ",
        assumptions: &[],
        unified: false,
        complete: false,
        code: "
            A = X2+Z2
            AA = A^2
            B = X2-Z2
            BB = B^2
            E = AA-BB
            C = X3+Z3
            D = X3-Z3
            DA = D*A
            CB = C*B
            t0 = DA+CB
            t1 = t0^2
            X5 = Z1*t1
            t2 = DA-CB
            t3 = t2^2
            Z5 = X1*t3
            X4 = AA*BB
            t4 = a24*E
            t5 = BB+t4
            Z4 = E*t5
        ",
    },
    FormulaDef {
        name: "dadd-1987-m",
        kind: DifferentialAdd,
        system: Xz,
        points: 3,
        source: "efd g1p/auto/montgom/xz/diffadd/dadd-1987-m",
        parameters: "",
        assumptions: &[],
        unified: false,
        complete: false,
        code: "
            A = X2+Z2
            B = X2-Z2
            C = X3+Z3
            D = X3-Z3
            DA = D*A
            CB = C*B
            t0 = DA+CB
            t1 = t0^2
            X4 = Z1*t1
            t2 = DA-CB
            t3 = t2^2
            Z4 = X1*t3
        ",
    },
    FormulaDef {
        name: "dbl-1987-m",
        kind: Double,
        system: Xz,
        points: 1,
        source: "efd g1p/auto/montgom/xz/doubling/dbl-1987-m",
        parameters: "
            a2 = a+2
            a24 = a2/4
        ",
        assumptions: &[],
        unified: false,
        complete: true,
        code: "
            A = X1+Z1
            AA = A^2
            B = X1-Z1
            BB = B^2
            C = AA-BB
            X3 = AA*BB
            t0 = a24*C
            t1 = BB+t0
            Z3 = C*t1
        ",
    },
    FormulaDef {
        name: "scale",
        kind: Scale,
        system: Xz,
        points: 1,
        source: "efd g1p/auto/montgom/xz/scaling/scale",
        parameters: "",
        assumptions: &[],
        unified: false,
        complete: false,
        code: "
            A = 1/Z1
            X3 = X1*A
            Z3 = 1
        ",
    },
    FormulaDef {
        name: "add-2008-hwcd",
        kind: Add,
        system: Extended,
        points: 2,
        source: "efd g1p/auto/twisted/extended/addition/add-2008-hwcd",
        parameters: "",
        assumptions: &[],
        unified: true,
        complete: true,
        code: "
            A = X1*X2
            B = Y1*Y2
            t0 = T1*d
            C = t0*T2
            D = Z1*Z2
            t1 = X1+Y1
            t2 = X2+Y2
            t3 = t1*t2
            t4 = t3-A
            E = t4-B
            F = D-C
            G = D+C
            t5 = a*A
            H = B-t5
            X3 = E*F
            Y3 = G*H
            T3 = E*H
            Z3 = F*G
        ",
    },
    FormulaDef {
        name: "dbl-2008-hwcd",
        kind: Double,
        system: Extended,
        points: 1,
        source: "efd g1p/auto/twisted/extended/doubling/dbl-2008-hwcd",
        parameters: "",
        assumptions: &[],
        unified: false,
        complete: true,
        code: "
            A = X1^2
            B = Y1^2
            t0 = Z1^2
            C = 2*t0
            D = a*A
            t1 = X1+Y1
            t2 = t1^2
            t3 = t2-A
            E = t3-B
            G = D+B
            F = G-C
            H = D-B
            X3 = E*F
            Y3 = G*H
            T3 = E*H
            Z3 = F*G
        ",
    },
    FormulaDef {
        name: "neg",
        kind: Negate,
        system: Extended,
        points: 1,
        source: "efd g1p/auto/twisted/extended/negation",
        parameters: "",
        assumptions: &[],
        unified: false,
        complete: true,
        code: "
            X3 = -X1
            Y3 = Y1
            T3 = -T1
            Z3 = Z1
        ",
    },
];
