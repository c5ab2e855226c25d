//! Typed arithmetic expression trees over model variables.
//!
//! Constraint bodies and the objective are built as [`Expr`] values by folding over ligand,
//! step and residual lists. Expressions can be evaluated at a point and differentiated
//! exactly with respect to any variable, which is what the Jacobian and the solver adapters
//! rely on.

use std::{
    collections::BTreeSet,
    fmt,
    ops::{Add, Div, Mul, Neg, Sub},
};

use serde::{Deserialize, Serialize};

/// Index of a variable in the global model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarId(pub usize);

/// Elementary functions available in expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Func {
    Exp,
    Ln,
    Sqrt,
}

impl Func {
    fn apply(&self, x: f64) -> f64 {
        match self {
            Func::Exp => x.exp(),
            Func::Ln => x.ln(),
            Func::Sqrt => x.sqrt(),
        }
    }

    fn derivative(&self, x: f64) -> f64 {
        match self {
            Func::Exp => x.exp(),
            Func::Ln => 1.0 / x,
            Func::Sqrt => 0.5 / x.sqrt(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Func::Exp => "exp",
            Func::Ln => "ln",
            Func::Sqrt => "sqrt",
        }
    }
}

/// An arithmetic expression over model variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Const(f64),
    Var(VarId),
    Sum(Vec<Expr>),
    Product(Vec<Expr>),
    Neg(Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Pow(Box<Expr>, Box<Expr>),
    Func(Func, Box<Expr>),
}

impl Expr {
    pub fn var(id: VarId) -> Self {
        Expr::Var(id)
    }

    pub fn constant(value: f64) -> Self {
        Expr::Const(value)
    }

    pub fn zero() -> Self {
        Expr::Const(0.0)
    }

    /// Sums an iterator of expressions, flattening nested sums.
    pub fn sum<I: IntoIterator<Item = Expr>>(terms: I) -> Self {
        let mut flat = vec![];
        for term in terms {
            match term {
                Expr::Sum(inner) => flat.extend(inner),
                Expr::Const(c) if c == 0.0 => {}
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Expr::zero(),
            1 => flat.remove(0),
            _ => Expr::Sum(flat),
        }
    }

    /// Multiplies an iterator of expressions, flattening nested products.
    pub fn product<I: IntoIterator<Item = Expr>>(factors: I) -> Self {
        let mut flat = vec![];
        for factor in factors {
            match factor {
                Expr::Product(inner) => flat.extend(inner),
                Expr::Const(c) if c == 1.0 => {}
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Expr::Const(1.0),
            1 => flat.remove(0),
            _ => Expr::Product(flat),
        }
    }

    pub fn powi(self, exponent: i32) -> Self {
        Expr::Pow(Box::new(self), Box::new(Expr::Const(exponent as f64)))
    }

    pub fn powf(self, exponent: Expr) -> Self {
        Expr::Pow(Box::new(self), Box::new(exponent))
    }

    pub fn apply(self, func: Func) -> Self {
        Expr::Func(func, Box::new(self))
    }

    /// Evaluates the expression at the point `x`, indexed by [`VarId`].
    pub fn eval(&self, x: &[f64]) -> f64 {
        match self {
            Expr::Const(c) => *c,
            Expr::Var(id) => x[id.0],
            Expr::Sum(terms) => terms.iter().map(|t| t.eval(x)).sum(),
            Expr::Product(factors) => factors.iter().map(|f| f.eval(x)).product(),
            Expr::Neg(inner) => -inner.eval(x),
            Expr::Div(num, den) => num.eval(x) / den.eval(x),
            Expr::Pow(base, exp) => pow(base.eval(x), exp.eval(x)),
            Expr::Func(func, arg) => func.apply(arg.eval(x)),
        }
    }

    /// Partial derivative with respect to `var` at the point `x`.
    pub fn partial(&self, var: VarId, x: &[f64]) -> f64 {
        match self {
            Expr::Const(_) => 0.0,
            Expr::Var(id) => {
                if *id == var {
                    1.0
                } else {
                    0.0
                }
            }
            Expr::Sum(terms) => terms.iter().map(|t| t.partial(var, x)).sum(),
            Expr::Product(factors) => {
                let values: Vec<f64> = factors.iter().map(|f| f.eval(x)).collect();
                factors
                    .iter()
                    .enumerate()
                    .map(|(i, f)| {
                        let d = f.partial(var, x);
                        if d == 0.0 {
                            return 0.0;
                        }
                        let rest: f64 = values
                            .iter()
                            .enumerate()
                            .filter(|(j, _)| *j != i)
                            .map(|(_, v)| v)
                            .product();
                        d * rest
                    })
                    .sum()
            }
            Expr::Neg(inner) => -inner.partial(var, x),
            Expr::Div(num, den) => {
                let n = num.eval(x);
                let d = den.eval(x);
                (num.partial(var, x) * d - n * den.partial(var, x)) / (d * d)
            }
            Expr::Pow(base, exp) => {
                let b = base.eval(x);
                let db = base.partial(var, x);
                match exp.as_ref() {
                    Expr::Const(n) => {
                        if db == 0.0 {
                            0.0
                        } else {
                            n * pow(b, n - 1.0) * db
                        }
                    }
                    exp => {
                        let e = exp.eval(x);
                        let de = exp.partial(var, x);
                        let value = pow(b, e);
                        let mut d = 0.0;
                        if db != 0.0 {
                            d += e * pow(b, e - 1.0) * db;
                        }
                        if de != 0.0 {
                            d += value * b.ln() * de;
                        }
                        d
                    }
                }
            }
            Expr::Func(func, arg) => {
                let da = arg.partial(var, x);
                if da == 0.0 {
                    0.0
                } else {
                    func.derivative(arg.eval(x)) * da
                }
            }
        }
    }

    /// Sorted, de-duplicated variables the expression depends on.
    pub fn variables(&self) -> Vec<VarId> {
        let mut vars = BTreeSet::new();
        self.collect_variables(&mut vars);
        vars.into_iter().collect()
    }

    fn collect_variables(&self, vars: &mut BTreeSet<VarId>) {
        match self {
            Expr::Const(_) => {}
            Expr::Var(id) => {
                vars.insert(*id);
            }
            Expr::Sum(items) | Expr::Product(items) => {
                items.iter().for_each(|i| i.collect_variables(vars))
            }
            Expr::Neg(inner) | Expr::Func(_, inner) => inner.collect_variables(vars),
            Expr::Div(a, b) | Expr::Pow(a, b) => {
                a.collect_variables(vars);
                b.collect_variables(vars);
            }
        }
    }

    /// Sparse gradient: `(variable, partial)` for every variable the expression uses.
    pub fn gradient(&self, x: &[f64]) -> Vec<(VarId, f64)> {
        self.variables()
            .into_iter()
            .map(|v| (v, self.partial(v, x)))
            .collect()
    }

    /// Renders the expression with variable names resolved by `names`.
    pub fn display<'a, F>(&'a self, names: F) -> ExprDisplay<'a, F>
    where
        F: Fn(VarId) -> String,
    {
        ExprDisplay { expr: self, names }
    }

    fn write<F: Fn(VarId) -> String>(&self, f: &mut fmt::Formatter<'_>, names: &F) -> fmt::Result {
        match self {
            Expr::Const(c) => write!(f, "{c}"),
            Expr::Var(id) => write!(f, "{}", names(*id)),
            Expr::Sum(terms) => {
                write!(f, "(")?;
                for (i, t) in terms.iter().enumerate() {
                    if i > 0 {
                        write!(f, " + ")?;
                    }
                    t.write(f, names)?;
                }
                write!(f, ")")
            }
            Expr::Product(factors) => {
                for (i, t) in factors.iter().enumerate() {
                    if i > 0 {
                        write!(f, "*")?;
                    }
                    t.write(f, names)?;
                }
                Ok(())
            }
            Expr::Neg(inner) => {
                write!(f, "-")?;
                inner.write(f, names)
            }
            Expr::Div(a, b) => {
                a.write(f, names)?;
                write!(f, "/(")?;
                b.write(f, names)?;
                write!(f, ")")
            }
            Expr::Pow(a, b) => {
                write!(f, "(")?;
                a.write(f, names)?;
                write!(f, ")^")?;
                b.write(f, names)
            }
            Expr::Func(func, arg) => {
                write!(f, "{}(", func.name())?;
                arg.write(f, names)?;
                write!(f, ")")
            }
        }
    }
}

fn pow(base: f64, exp: f64) -> f64 {
    if exp.fract() == 0.0 && exp.abs() <= i32::MAX as f64 {
        base.powi(exp as i32)
    } else {
        base.powf(exp)
    }
}

/// Display adapter returned by [`Expr::display`].
pub struct ExprDisplay<'a, F> {
    expr: &'a Expr,
    names: F,
}

impl<F: Fn(VarId) -> String> fmt::Display for ExprDisplay<'_, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.expr.write(f, &self.names)
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Const(value)
    }
}

impl From<VarId> for Expr {
    fn from(id: VarId) -> Self {
        Expr::Var(id)
    }
}

impl Add for Expr {
    type Output = Expr;

    fn add(self, rhs: Expr) -> Expr {
        Expr::sum([self, rhs])
    }
}

impl Sub for Expr {
    type Output = Expr;

    fn sub(self, rhs: Expr) -> Expr {
        Expr::sum([self, -rhs])
    }
}

impl Mul for Expr {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        Expr::product([self, rhs])
    }
}

impl Div for Expr {
    type Output = Expr;

    fn div(self, rhs: Expr) -> Expr {
        Expr::Div(Box::new(self), Box::new(rhs))
    }
}

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        match self {
            Expr::Const(c) => Expr::Const(-c),
            Expr::Neg(inner) => *inner,
            other => Expr::Neg(Box::new(other)),
        }
    }
}

impl Add<f64> for Expr {
    type Output = Expr;

    fn add(self, rhs: f64) -> Expr {
        self + Expr::Const(rhs)
    }
}

impl Sub<f64> for Expr {
    type Output = Expr;

    fn sub(self, rhs: f64) -> Expr {
        self - Expr::Const(rhs)
    }
}

impl Mul<Expr> for f64 {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        Expr::Const(self) * rhs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn x() -> Expr {
        Expr::var(VarId(0))
    }

    fn y() -> Expr {
        Expr::var(VarId(1))
    }

    #[test]
    fn test_eval_and_partials() {
        // f = x*y - 3/(x + y) + x^2
        let f = x() * y() - Expr::constant(3.0) / (x() + y()) + x().powi(2);
        let point = [2.0, 1.0];

        assert_relative_eq!(f.eval(&point), 2.0 - 1.0 + 4.0);
        // df/dx = y + 3/(x+y)^2 + 2x
        assert_relative_eq!(f.partial(VarId(0), &point), 1.0 + 3.0 / 9.0 + 4.0);
        // df/dy = x + 3/(x+y)^2
        assert_relative_eq!(f.partial(VarId(1), &point), 2.0 + 3.0 / 9.0);
        assert_eq!(f.variables(), vec![VarId(0), VarId(1)]);
    }

    #[test]
    fn test_functions_and_general_power() {
        let f = x().apply(Func::Ln) + y().apply(Func::Exp) + x().powf(y());
        let point = [2.0, 0.5];

        let expected = 2.0_f64.ln() + 0.5_f64.exp() + 2.0_f64.powf(0.5);
        assert_relative_eq!(f.eval(&point), expected);
        assert_relative_eq!(
            f.partial(VarId(1), &point),
            0.5_f64.exp() + 2.0_f64.powf(0.5) * 2.0_f64.ln(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_sum_and_product_flatten() {
        let e = Expr::sum([x() + y(), Expr::zero(), x()]);
        assert!(matches!(&e, Expr::Sum(terms) if terms.len() == 3));

        let p = Expr::product([Expr::Const(1.0), x() * y()]);
        assert!(matches!(&p, Expr::Product(factors) if factors.len() == 2));

        assert_eq!(Expr::sum(Vec::<Expr>::new()), Expr::zero());
    }

    #[test]
    fn test_display() {
        let f = Expr::constant(2.0) * x() - y();
        let names = ["kf", "e"];
        let rendered = f.display(|id| names[id.0].to_string()).to_string();
        assert_eq!(rendered, "(2*kf + -e)");
    }
}
