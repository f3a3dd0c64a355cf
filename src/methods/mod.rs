// HyPhy method adapters and the registry that orders them.

pub mod busted;
pub mod cfel;
pub mod fel;
pub mod meme;
pub mod mle;
pub mod prime;
pub mod registry;
pub mod relax;

pub use busted::Busted;
pub use cfel::Cfel;
pub use fel::Fel;
pub use meme::Meme;
pub use prime::Prime;
pub use registry::{MethodRegistry, ResolvedMethod};
pub use relax::Relax;
