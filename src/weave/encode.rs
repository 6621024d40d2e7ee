//! Module encoders
//!
//! The weaver produces an in-memory [`ModuleDef`]; an [`Encoder`] turns it
//! into bytes. Encoding is kept apart from rewriting so a binary writer can
//! replace the JSON one without touching the instrumentation code.

use super::model::ModuleDef;
use crate::{WeaveError, WeaveResult};
use std::io::{Read, Write};

/// Writes a rewritten module to a sink
pub trait Encoder {
    fn encode(&self, module: &ModuleDef, sink: &mut dyn Write) -> WeaveResult<()>;
}

/// JSON encoding of the module model
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder {
    pub pretty: bool,
}

impl JsonEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pretty() -> Self {
        Self { pretty: true }
    }

    /// Read a module previously written by [`encode`](Encoder::encode)
    pub fn decode(&self, source: impl Read) -> WeaveResult<ModuleDef> {
        serde_json::from_reader(source).map_err(|e| WeaveError::Encode {
            module: "<input>".to_string(),
            reason: e.to_string(),
        })
    }
}

impl Encoder for JsonEncoder {
    fn encode(&self, module: &ModuleDef, sink: &mut dyn Write) -> WeaveResult<()> {
        let written = if self.pretty {
            serde_json::to_writer_pretty(&mut *sink, module)
        } else {
            serde_json::to_writer(&mut *sink, module)
        };
        written
            .and_then(|()| sink.flush().map_err(serde_json::Error::io))
            .map_err(|e| WeaveError::Encode {
                module: module.name.clone(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weave::il::{MethodBody, Op};
    use crate::weave::model::{MethodDef, MethodKind, TypeDef};

    struct FailingSink;

    impl Write for FailingSink {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("disk full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_json_preserves_bodies() {
        let mut run = MethodDef::new("Run", MethodKind::Method);
        run.body = Some(MethodBody::from_ops([Op::LoadNull, Op::Pop, Op::Return]));
        let mut ty = TypeDef::class("App.Service");
        ty.methods.push(run);
        let module = ModuleDef::new("App").with_type(ty);

        let mut bytes = Vec::new();
        JsonEncoder::pretty().encode(&module, &mut bytes).unwrap();
        let decoded = JsonEncoder::new().decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded, module);

        let mut body = decoded.types[0].methods[1].body.clone().unwrap();
        let next = body.allocate_label();
        assert!(body.position_of(next).is_none());
    }

    #[test]
    fn test_sink_failure_is_encode_error() {
        let err = JsonEncoder::new()
            .encode(&ModuleDef::new("App"), &mut FailingSink)
            .unwrap_err();
        assert!(matches!(err, WeaveError::Encode { ref module, .. } if module == "App"));
    }
}
