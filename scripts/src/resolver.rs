//! The parameter resolver: turns a step's argument specs into concrete,
//! ABI-typed constructor arguments.
//!
//! Resolution is a pure function of the artifact, the argument specs, and
//! the ledger; it performs no I/O.

use alloy::{
    dyn_abi::{DynSolType, DynSolValue, JsonAbiExt, Specifier},
    json_abi::{Function, Param},
    primitives::{Bytes, I256},
};
use migrations_common::types::{ArgumentSpec, LiteralValue};

use crate::{artifacts::Artifact, errors::DeployError, ledger::DeploymentLedger};

/// Constructor arguments resolved against an artifact's signature
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedArguments {
    /// The typed argument values, in positional order
    pub values: Vec<DynSolValue>,
    /// The ABI encoding of the values, appended to the creation bytecode
    pub encoded: Bytes,
}

impl ResolvedArguments {
    /// The full creation code for the artifact: bytecode followed by the
    /// encoded constructor arguments
    pub fn creation_code(&self, artifact: &Artifact) -> Bytes {
        let mut code = artifact.bytecode.to_vec();
        code.extend_from_slice(&self.encoded);
        code.into()
    }
}

/// Resolve a step's constructor arguments.
///
/// Literals are checked against the declared constructor parameters;
/// references are looked up in the ledger and must feed an `address`
/// parameter.
pub fn resolve_arguments(
    artifact: &Artifact,
    specs: &[ArgumentSpec],
    ledger: &DeploymentLedger,
) -> Result<ResolvedArguments, DeployError> {
    let inputs = artifact.constructor_inputs();
    if inputs.len() != specs.len() {
        return Err(DeployError::ArgumentTypeMismatch(format!(
            "`{}` constructor takes {} arguments, {} given",
            artifact.id,
            inputs.len(),
            specs.len()
        )));
    }

    let mut values = Vec::with_capacity(specs.len());
    for (position, (spec, param)) in specs.iter().zip(inputs).enumerate() {
        let ty = param_type(param)?;
        let value = match spec {
            ArgumentSpec::Literal(literal) => literal_to_value(literal, &ty).map_err(|reason| {
                DeployError::ArgumentTypeMismatch(format!(
                    "`{}` argument {} ({}): {}",
                    artifact.id,
                    position,
                    param_label(param),
                    reason
                ))
            })?,
            ArgumentSpec::Reference(step) => {
                let address = ledger.get(step).ok_or_else(|| {
                    DeployError::UnresolvedReference(format!(
                        "`{}` argument {} references `{}`, which has not been deployed in this run",
                        artifact.id, position, step
                    ))
                })?;

                if ty != DynSolType::Address {
                    return Err(DeployError::ArgumentTypeMismatch(format!(
                        "`{}` argument {} ({}): a reference to `{}` yields an address, expected {}",
                        artifact.id,
                        position,
                        param_label(param),
                        step,
                        ty.sol_type_name()
                    )));
                }

                DynSolValue::Address(address)
            }
        };

        values.push(value);
    }

    let encoded = DynSolValue::Tuple(values.clone()).abi_encode_params().into();
    Ok(ResolvedArguments { values, encoded })
}

/// Encode a call to the named method of the artifact with literal arguments.
///
/// Overloads are disambiguated by arity, then by whether the literals fit
/// the parameter types; the first overload that fits is used.
pub fn encode_call(
    artifact: &Artifact,
    method: &str,
    arguments: &[LiteralValue],
) -> Result<Bytes, String> {
    let overloads = artifact
        .abi
        .function(method)
        .ok_or_else(|| format!("`{}` has no method `{}`", artifact.id, method))?;

    let mut last_err = format!(
        "`{}` has no overload of `{}` taking {} arguments",
        artifact.id,
        method,
        arguments.len()
    );
    for function in overloads.iter().filter(|f| f.inputs.len() == arguments.len()) {
        match function_values(function, arguments) {
            Ok(values) => {
                return function
                    .abi_encode_input(&values)
                    .map(Bytes::from)
                    .map_err(|e| e.to_string());
            }
            Err(e) => last_err = e,
        }
    }

    Err(last_err)
}

/// Convert literal arguments to values for the given function's inputs
fn function_values(
    function: &Function,
    arguments: &[LiteralValue],
) -> Result<Vec<DynSolValue>, String> {
    function
        .inputs
        .iter()
        .zip(arguments)
        .enumerate()
        .map(|(position, (param, literal))| {
            let ty = param.resolve().map_err(|e| e.to_string())?;
            literal_to_value(literal, &ty).map_err(|reason| {
                format!(
                    "`{}` argument {} ({}): {}",
                    function.signature(),
                    position,
                    param_label(param),
                    reason
                )
            })
        })
        .collect()
}

/// Resolve the ABI type of a constructor parameter
fn param_type(param: &Param) -> Result<DynSolType, DeployError> {
    param.resolve().map_err(|e| {
        DeployError::ArgumentTypeMismatch(format!(
            "unsupported parameter type `{}`: {}",
            param.ty, e
        ))
    })
}

/// A label for a parameter in diagnostics: its name if it has one, else its type
fn param_label(param: &Param) -> &str {
    if param.name.is_empty() {
        &param.ty
    } else {
        &param.name
    }
}

/// Convert a literal into a value of the given ABI type, or explain why it
/// does not fit
pub fn literal_to_value(literal: &LiteralValue, ty: &DynSolType) -> Result<DynSolValue, String> {
    let mismatch = || {
        format!(
            "expected {}, got {} `{}`",
            ty.sol_type_name(),
            literal.kind(),
            literal
        )
    };

    match (literal, ty) {
        (LiteralValue::Address(address), DynSolType::Address) => {
            Ok(DynSolValue::Address(*address))
        }
        (LiteralValue::Bool(b), DynSolType::Bool) => Ok(DynSolValue::Bool(*b)),
        (LiteralValue::String(s), DynSolType::String) => Ok(DynSolValue::String(s.clone())),
        (LiteralValue::Number(n), DynSolType::Uint(bits)) => {
            if n.bit_len() > *bits {
                return Err(format!("{n} does not fit in uint{bits}"));
            }
            Ok(DynSolValue::Uint(*n, *bits))
        }
        (LiteralValue::Number(n), DynSolType::Int(bits)) => {
            if n.bit_len() >= *bits {
                return Err(format!("{n} does not fit in int{bits}"));
            }
            Ok(DynSolValue::Int(I256::from_raw(*n), *bits))
        }
        (LiteralValue::Addresses(_) | LiteralValue::Numbers(_) | LiteralValue::Strings(_), _) => {
            let elements = array_elements(literal);
            match ty {
                DynSolType::Array(inner) => elements
                    .iter()
                    .map(|element| literal_to_value(element, inner))
                    .collect::<Result<Vec<_>, _>>()
                    .map(DynSolValue::Array),
                DynSolType::FixedArray(inner, len) => {
                    if elements.len() != *len {
                        return Err(format!(
                            "expected {} elements for {}, got {}",
                            len,
                            ty.sol_type_name(),
                            elements.len()
                        ));
                    }
                    elements
                        .iter()
                        .map(|element| literal_to_value(element, inner))
                        .collect::<Result<Vec<_>, _>>()
                        .map(DynSolValue::FixedArray)
                }
                _ => Err(mismatch()),
            }
        }
        _ => Err(mismatch()),
    }
}

/// Split an array literal into scalar literals
fn array_elements(literal: &LiteralValue) -> Vec<LiteralValue> {
    match literal {
        LiteralValue::Addresses(addresses) => {
            addresses.iter().copied().map(LiteralValue::Address).collect()
        }
        LiteralValue::Numbers(numbers) => {
            numbers.iter().copied().map(LiteralValue::Number).collect()
        }
        LiteralValue::Strings(strings) => {
            strings.iter().cloned().map(LiteralValue::String).collect()
        }
        scalar => vec![scalar.clone()],
    }
}
