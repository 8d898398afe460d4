//! The interface every pass implements.
use tidal_ir::Graph;
use tidal_utils::TidalResult;

/// Trait that describes named things. Pass registration uses the name to
/// identify passes on the command line and the description in listings.
///
/// This has to be a separate trait from [`Pass`] because these methods don't
/// receive `self`, which means that it is impossible to create dynamic trait
/// objects from it.
pub trait Named {
    /// The name of a pass. Is used for identifying passes.
    fn name() -> &'static str;
    /// A short description of the pass.
    fn description() -> &'static str;
}

/// A transformation over the IR arena. Passes run single-threaded to
/// completion; the first error aborts the pass.
pub trait Pass {
    fn run(&mut self, graph: &mut Graph) -> TidalResult<()>;
}
