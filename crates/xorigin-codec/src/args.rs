use serde::Serialize;

use crate::block::{encode, Block, BlockEncoding};
use crate::error::Result;

/// An ordered list of call arguments.
///
/// Implemented for `()`, tuples of up to eight [`Serialize`] values, slices,
/// arrays and vectors. Each argument becomes its own [`Block`], in order.
pub trait Arguments {
    /// Number of arguments.
    fn count(&self) -> usize;

    /// Encode every argument and append the blocks to `out`.
    fn encode_into(&self, out: &mut Vec<Block>, encoding: BlockEncoding) -> Result<()>;
}

impl Arguments for () {
    fn count(&self) -> usize {
        0
    }

    fn encode_into(&self, _out: &mut Vec<Block>, _encoding: BlockEncoding) -> Result<()> {
        Ok(())
    }
}

impl<T: Serialize> Arguments for [T] {
    fn count(&self) -> usize {
        self.len()
    }

    fn encode_into(&self, out: &mut Vec<Block>, encoding: BlockEncoding) -> Result<()> {
        for arg in self {
            out.push(encode(arg, encoding)?);
        }
        Ok(())
    }
}

impl<T: Serialize, const N: usize> Arguments for [T; N] {
    fn count(&self) -> usize {
        N
    }

    fn encode_into(&self, out: &mut Vec<Block>, encoding: BlockEncoding) -> Result<()> {
        self.as_slice().encode_into(out, encoding)
    }
}

impl<T: Serialize> Arguments for Vec<T> {
    fn count(&self) -> usize {
        self.len()
    }

    fn encode_into(&self, out: &mut Vec<Block>, encoding: BlockEncoding) -> Result<()> {
        self.as_slice().encode_into(out, encoding)
    }
}

macro_rules! tuple_arguments {
    ($($name:ident . $idx:tt),+) => {
        impl<$($name: Serialize),+> Arguments for ($($name,)+) {
            fn count(&self) -> usize {
                [$(stringify!($name)),+].len()
            }

            fn encode_into(&self, out: &mut Vec<Block>, encoding: BlockEncoding) -> Result<()> {
                $(out.push(encode(&self.$idx, encoding)?);)+
                Ok(())
            }
        }
    };
}

tuple_arguments!(A.0);
tuple_arguments!(A.0, B.1);
tuple_arguments!(A.0, B.1, C.2);
tuple_arguments!(A.0, B.1, C.2, D.3);
tuple_arguments!(A.0, B.1, C.2, D.3, E.4);
tuple_arguments!(A.0, B.1, C.2, D.3, E.4, F.5);
tuple_arguments!(A.0, B.1, C.2, D.3, E.4, F.5, G.6);
tuple_arguments!(A.0, B.1, C.2, D.3, E.4, F.5, G.6, H.7);
