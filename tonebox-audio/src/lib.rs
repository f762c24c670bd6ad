pub mod engine;
pub mod input;
pub mod takes;

pub use engine::{
    BackendError, BackendResult, CapturedAudio, CpalBackend, GraphOp, NullBackend,
    SharedTestBackend, SynthBackend, TestBackend, TestOp,
};
pub use input::{CaptureCompletion, CpalMicrophone, MicrophoneSession, MicrophoneSource, TestMicrophone};
pub use takes::TakeStore;
