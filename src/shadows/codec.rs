//! Shadow of `android.media.MediaCodec`.
//!
//! The real codec classes are declared with native members only; everything
//! they do comes from [`ShadowMediaCodec`](SHADOW_MEDIA_CODEC). The shadow
//! moves bytes through a [`CodecConfig`] function instead of a hardware codec,
//! and models both operating modes:
//!
//! - **Synchronous**: the scenario polls `dequeueInputBuffer` and
//!   `dequeueOutputBuffer`. The first output dequeue after `start` reports
//!   [`INFO_OUTPUT_FORMAT_CHANGED`], empty queues report
//!   [`INFO_TRY_AGAIN_LATER`].
//! - **Asynchronous**: a `MediaCodec$Callback` is set before `start`, and
//!   buffer availability is reported through tasks posted to the sandbox
//!   queue. Nothing is delivered until the scenario drains the queue.
//!
//! ```text
//!  start ──► onOutputFormatChanged ──► onInputBufferAvailable
//!                                              │
//!                                     queueInputBuffer
//!                                              │
//!                                              ▼
//!                                   onOutputBufferAvailable
//!                                              │
//!                                    releaseOutputBuffer
//!                                              │
//!                      end of stream? ── no ──► onInputBufferAvailable
//! ```
//!
//! Registered encoders and the output format override live in the shadow's
//! statics, so they are scoped to one sandbox.

use std::{
    collections::{HashMap, VecDeque},
    fmt,
    sync::Arc,
};

use log::trace;
use strum::Display;

use crate::{
    model::{ClassPath, MemberSignature, ObjectRef, RealClass, ShadowCatalog, ShadowClass, TypeDesc, Value},
    runtime::{Invocation, ShadowRef},
    Result, Sandbox,
};

/// The real codec class.
pub const MEDIA_CODEC: &str = "android.media.MediaCodec";
/// Metadata of one output buffer.
pub const BUFFER_INFO: &str = "android.media.MediaCodec$BufferInfo";
/// Base class of asynchronous codec callbacks.
pub const CALLBACK: &str = "android.media.MediaCodec$Callback";
/// Key/value media format description.
pub const MEDIA_FORMAT: &str = "android.media.MediaFormat";
/// Catalog name of the codec shadow.
pub const SHADOW_MEDIA_CODEC: &str = "ShadowMediaCodec";

/// Buffer flag marking the last buffer of a stream.
pub const BUFFER_FLAG_END_OF_STREAM: i32 = 4;
/// `configure` flag selecting an encoder.
pub const CONFIGURE_FLAG_ENCODE: i32 = 1;
/// No buffer is available yet.
pub const INFO_TRY_AGAIN_LATER: i32 = -1;
/// The output format changed; returned once before the first output buffer.
pub const INFO_OUTPUT_FORMAT_CHANGED: i32 = -2;

/// `MediaFormat` key of the MIME type.
pub const KEY_MIME: &str = "mime";
/// `MediaFormat` key of the channel count.
pub const KEY_CHANNEL_COUNT: &str = "channel-count";
/// `MediaFormat` key of the sample rate.
pub const KEY_SAMPLE_RATE: &str = "sample-rate";
/// `MediaFormat` key of the bit rate.
pub const KEY_BIT_RATE: &str = "bitrate";

const BUFFER_COUNT: usize = 10;
const DEFAULT_BUFFER_SIZE: usize = 512;

/// Transforms the bytes of one input buffer into an output buffer.
pub type CodecFn = Arc<dyn Fn(&[u8], &mut Vec<u8>) + Send + Sync>;

/// Buffer sizes and transformation of a fake codec.
///
/// The default is a 512-byte identity codec.
#[derive(Clone)]
pub struct CodecConfig {
    input_buffer_size: usize,
    output_buffer_size: usize,
    codec: CodecFn,
}

impl CodecConfig {
    /// Creates a codec configuration.
    ///
    /// `codec` receives the queued input bytes and appends its output; it
    /// may write at most `output_buffer_size` bytes.
    #[must_use]
    pub fn new<F>(input_buffer_size: usize, output_buffer_size: usize, codec: F) -> Self
    where
        F: Fn(&[u8], &mut Vec<u8>) + Send + Sync + 'static,
    {
        Self {
            input_buffer_size,
            output_buffer_size,
            codec: Arc::new(codec),
        }
    }

    /// Capacity of every input buffer.
    #[must_use]
    pub fn input_buffer_size(&self) -> usize {
        self.input_buffer_size
    }

    /// Capacity of every output buffer.
    #[must_use]
    pub fn output_buffer_size(&self) -> usize {
        self.output_buffer_size
    }

    /// Runs the codec over one input buffer.
    ///
    /// # Errors
    ///
    /// Raises `BufferOverflowException` if the input or the produced output
    /// exceed their buffer capacity.
    pub fn process(&self, input: &[u8]) -> Result<Vec<u8>> {
        if input.len() > self.input_buffer_size {
            return Err(raise!(
                "BufferOverflowException",
                "{} bytes queued into a {}-byte input buffer",
                input.len(),
                self.input_buffer_size
            ));
        }

        let mut output = Vec::with_capacity(self.output_buffer_size);
        (self.codec)(input, &mut output);
        if output.len() > self.output_buffer_size {
            return Err(raise!(
                "BufferOverflowException",
                "codec wrote {} bytes into a {}-byte output buffer",
                output.len(),
                self.output_buffer_size
            ));
        }
        Ok(output)
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE, DEFAULT_BUFFER_SIZE, |input, output| {
            output.extend_from_slice(input);
        })
    }
}

impl fmt::Debug for CodecConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecConfig")
            .field("input_buffer_size", &self.input_buffer_size)
            .field("output_buffer_size", &self.output_buffer_size)
            .finish_non_exhaustive()
    }
}

/// Snapshot of a `MediaCodec$BufferInfo` instance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferInfo {
    /// Start of the valid data in the buffer.
    pub offset: i32,
    /// Number of valid bytes.
    pub size: i32,
    /// Presentation timestamp in microseconds.
    pub presentation_time_us: i64,
    /// Buffer flags, see [`BUFFER_FLAG_END_OF_STREAM`].
    pub flags: i32,
}

impl BufferInfo {
    /// Reads the fields of a `MediaCodec$BufferInfo` instance.
    ///
    /// # Errors
    ///
    /// Isolation errors from the sandbox.
    pub fn read(sandbox: &Sandbox, info: &ObjectRef) -> Result<Self> {
        let int = |name: &str| -> Result<i32> { Ok(sandbox.get_field(info, name)?.as_int().unwrap_or(0)) };
        Ok(Self {
            offset: int("offset")?,
            size: int("size")?,
            presentation_time_us: sandbox
                .get_field(info, "presentationTimeUs")?
                .as_long()
                .unwrap_or(0),
            flags: int("flags")?,
        })
    }

    /// Returns `true` if the buffer ends the stream.
    #[must_use]
    pub fn is_end_of_stream(&self) -> bool {
        self.flags & BUFFER_FLAG_END_OF_STREAM != 0
    }
}

/// Codec statics of one sandbox.
#[derive(Default)]
struct CodecStatics {
    encoders: HashMap<String, CodecConfig>,
    decoders: HashMap<String, CodecConfig>,
    output_format: Option<ObjectRef>,
}

impl CodecStatics {
    fn lookup(&self, mime: &str, encoder: bool) -> Option<CodecConfig> {
        if encoder {
            self.encoders.get(mime).cloned()
        } else {
            self.decoders.get(mime).cloned()
        }
    }
}

/// Registers the codec `createEncoderByType(mime)` creates in this sandbox.
///
/// # Errors
///
/// Returns [`crate::Error::NoShadow`] if the codec shadow is not active.
pub fn register_encoder(sandbox: &Sandbox, mime: impl Into<String>, config: CodecConfig) -> Result<()> {
    sandbox.shadow_statics(SHADOW_MEDIA_CODEC, |statics: &mut CodecStatics| {
        statics.encoders.insert(mime.into(), config);
    })
}

/// Registers the codec `createDecoderByType(mime)` creates in this sandbox.
///
/// # Errors
///
/// Returns [`crate::Error::NoShadow`] if the codec shadow is not active.
pub fn register_decoder(sandbox: &Sandbox, mime: impl Into<String>, config: CodecConfig) -> Result<()> {
    sandbox.shadow_statics(SHADOW_MEDIA_CODEC, |statics: &mut CodecStatics| {
        statics.decoders.insert(mime.into(), config);
    })
}

/// Makes every codec in this sandbox report `format` from `getOutputFormat`.
///
/// # Errors
///
/// Returns [`crate::Error::NoShadow`] if the codec shadow is not active.
pub fn set_output_format(sandbox: &Sandbox, format: &ObjectRef) -> Result<()> {
    let format = format.clone();
    sandbox.shadow_statics(SHADOW_MEDIA_CODEC, |statics: &mut CodecStatics| {
        statics.output_format = Some(format);
    })
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display)]
enum Phase {
    #[default]
    #[strum(to_string = "uninitialized")]
    Uninitialized,
    #[strum(to_string = "configured")]
    Configured,
    #[strum(to_string = "started")]
    Started,
    #[strum(to_string = "released")]
    Released,
}

#[derive(Clone, Copy, Debug, Default)]
struct BufferMeta {
    size: i32,
    presentation_time_us: i64,
    flags: i32,
}

/// Per-instance state of [`SHADOW_MEDIA_CODEC`].
#[derive(Debug, Default)]
pub struct CodecState {
    mime: String,
    encoder: bool,
    config: CodecConfig,
    format: Option<ObjectRef>,
    callback: Option<ObjectRef>,
    phase: Phase,
    free_inputs: VecDeque<usize>,
    free_outputs: VecDeque<usize>,
    pending_outputs: VecDeque<usize>,
    outputs: Vec<Vec<u8>>,
    metas: Vec<BufferMeta>,
    format_reported: bool,
    end_of_stream: bool,
}

impl CodecState {
    /// The MIME type the codec was created for.
    #[must_use]
    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// Returns `true` for encoders.
    #[must_use]
    pub fn is_encoder(&self) -> bool {
        self.encoder
    }

    /// The codec function in use.
    #[must_use]
    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Returns `true` while started.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.phase == Phase::Started
    }

    /// Returns `true` if a callback is set.
    #[must_use]
    pub fn is_async(&self) -> bool {
        self.callback.is_some()
    }

    /// Returns `true` once a buffer flagged end-of-stream was queued.
    #[must_use]
    pub fn reached_end_of_stream(&self) -> bool {
        self.end_of_stream
    }

    fn require_started(&self) -> Result<()> {
        if self.phase == Phase::Started {
            Ok(())
        } else {
            Err(raise!("IllegalStateException", "codec is {}", self.phase))
        }
    }

    fn require_sync(&self, operation: &str) -> Result<()> {
        if self.callback.is_some() {
            return Err(raise!("IllegalStateException", "{} is not allowed in asynchronous mode", operation));
        }
        Ok(())
    }

    fn configure(&mut self, inv: &Invocation<'_>) -> Result<Value> {
        if self.phase != Phase::Uninitialized {
            return Err(raise!("IllegalStateException", "configure on a {} codec", self.phase));
        }
        self.format = inv.arg_object(0)?.cloned();
        self.encoder = inv.arg_int(1)? & CONFIGURE_FLAG_ENCODE != 0;
        self.phase = Phase::Configured;
        Ok(Value::Void)
    }

    fn set_callback(&mut self, inv: &Invocation<'_>) -> Result<Value> {
        if matches!(self.phase, Phase::Started | Phase::Released) {
            return Err(raise!("IllegalStateException", "setCallback on a {} codec", self.phase));
        }
        self.callback = inv.arg_object(0)?.cloned();
        Ok(Value::Void)
    }

    fn start(&mut self, inv: &Invocation<'_>) -> Result<Value> {
        if self.phase != Phase::Configured {
            return Err(raise!("IllegalStateException", "start on a {} codec", self.phase));
        }

        self.free_inputs = (0..BUFFER_COUNT).collect();
        self.free_outputs = (0..BUFFER_COUNT).collect();
        self.pending_outputs.clear();
        self.outputs = vec![Vec::new(); BUFFER_COUNT];
        self.metas = vec![BufferMeta::default(); BUFFER_COUNT];
        self.format_reported = false;
        self.end_of_stream = false;
        self.phase = Phase::Started;
        trace!("{} started ({})", self.mime, if self.is_async() { "async" } else { "sync" });

        if let Some(callback) = self.callback.clone() {
            let codec = inv.this()?.clone();
            let format = self.output_format(inv)?;
            self.format_reported = true;
            notify(
                inv,
                callback.clone(),
                on_output_format_changed(),
                vec![codec.clone().into(), format.into()],
            )?;
            self.offer_input(inv, callback, codec)?;
        }
        Ok(Value::Void)
    }

    fn stop(&mut self, _inv: &Invocation<'_>) -> Result<Value> {
        if self.phase == Phase::Released {
            return Err(raise!("IllegalStateException", "stop on a released codec"));
        }
        self.free_inputs.clear();
        self.free_outputs.clear();
        self.pending_outputs.clear();
        self.outputs.clear();
        self.metas.clear();
        self.phase = Phase::Uninitialized;
        Ok(Value::Void)
    }

    fn release(&mut self, inv: &Invocation<'_>) -> Result<Value> {
        if self.phase != Phase::Released {
            self.stop(inv)?;
        }
        self.callback = None;
        self.format = None;
        self.phase = Phase::Released;
        Ok(Value::Void)
    }

    fn dequeue_input_buffer(&mut self, _inv: &Invocation<'_>) -> Result<Value> {
        self.require_started()?;
        self.require_sync("dequeueInputBuffer")?;
        Ok(self
            .free_inputs
            .pop_front()
            .map_or(Value::Int(INFO_TRY_AGAIN_LATER), index_value))
    }

    fn get_input_buffer(&mut self, inv: &Invocation<'_>) -> Result<Value> {
        self.require_started()?;
        buffer_index(inv, 0)?;
        Ok(Value::Bytes(vec![0; self.config.input_buffer_size()]))
    }

    fn queue_input_buffer(&mut self, inv: &Invocation<'_>) -> Result<Value> {
        self.require_started()?;
        let input = buffer_index(inv, 0)?;
        let data = inv.arg_bytes(1)?;
        let presentation_time_us = inv.arg_long(2)?;
        let flags = inv.arg_int(3)?;
        if self.end_of_stream {
            return Err(raise!("IllegalStateException", "input queued after end of stream"));
        }

        let output = self.config.process(data)?;
        let index = self
            .free_outputs
            .pop_front()
            .ok_or_else(|| raise!("IllegalStateException", "no free output buffer"))?;
        if !self.free_inputs.contains(&input) {
            self.free_inputs.push_back(input);
        }

        let meta = BufferMeta {
            size: i32::try_from(output.len()).unwrap_or(i32::MAX),
            presentation_time_us,
            flags,
        };
        self.outputs[index] = output;
        self.metas[index] = meta;
        if flags & BUFFER_FLAG_END_OF_STREAM != 0 {
            self.end_of_stream = true;
        }

        match self.callback.clone() {
            Some(callback) => {
                let sandbox = inv.sandbox();
                let info = sandbox.new_instance(BUFFER_INFO, &[])?;
                write_info(sandbox, &info, meta)?;
                notify(
                    inv,
                    callback,
                    on_output_buffer_available(),
                    vec![inv.this()?.clone().into(), index_value(index), info.into()],
                )?;
            }
            None => self.pending_outputs.push_back(index),
        }
        Ok(Value::Void)
    }

    fn dequeue_output_buffer(&mut self, inv: &Invocation<'_>) -> Result<Value> {
        self.require_started()?;
        self.require_sync("dequeueOutputBuffer")?;
        let info = inv
            .arg_object(0)?
            .ok_or_else(|| raise!("NullPointerException", "BufferInfo is null"))?;

        if !self.format_reported {
            self.format_reported = true;
            return Ok(Value::Int(INFO_OUTPUT_FORMAT_CHANGED));
        }
        match self.pending_outputs.pop_front() {
            Some(index) => {
                write_info(inv.sandbox(), info, self.metas[index])?;
                Ok(index_value(index))
            }
            None => Ok(Value::Int(INFO_TRY_AGAIN_LATER)),
        }
    }

    /// Returns a buffer of the configured output capacity. The produced bytes
    /// sit at its start; `BufferInfo.size` says how many are valid.
    fn get_output_buffer(&mut self, inv: &Invocation<'_>) -> Result<Value> {
        self.require_started()?;
        let index = buffer_index(inv, 0)?;
        let produced = &self.outputs[index];
        let mut buffer = vec![0; self.config.output_buffer_size()];
        let len = produced.len().min(buffer.len());
        buffer[..len].copy_from_slice(&produced[..len]);
        Ok(Value::Bytes(buffer))
    }

    fn release_output_buffer(&mut self, inv: &Invocation<'_>) -> Result<Value> {
        self.require_started()?;
        let index = buffer_index(inv, 0)?;
        if self.free_outputs.contains(&index) || self.pending_outputs.contains(&index) {
            return Err(raise!("IllegalStateException", "output buffer {} is not owned by the client", index));
        }

        self.outputs[index].clear();
        self.free_outputs.push_back(index);

        if let Some(callback) = self.callback.clone() {
            if !self.end_of_stream {
                self.offer_input(inv, callback, inv.this()?.clone())?;
            }
        }
        Ok(Value::Void)
    }

    fn get_output_format(&mut self, inv: &Invocation<'_>) -> Result<Value> {
        Ok(self.output_format(inv)?.into())
    }

    fn offer_input(&mut self, inv: &Invocation<'_>, callback: ObjectRef, codec: ObjectRef) -> Result<()> {
        if let Some(input) = self.free_inputs.pop_front() {
            notify(
                inv,
                callback,
                on_input_buffer_available(),
                vec![codec.into(), index_value(input)],
            )?;
        }
        Ok(())
    }

    fn output_format(&mut self, inv: &Invocation<'_>) -> Result<ObjectRef> {
        if let Some(format) = inv.statics(|statics: &mut CodecStatics| statics.output_format.clone())? {
            return Ok(format);
        }
        if let Some(format) = &self.format {
            return Ok(format.clone());
        }

        let sandbox = inv.sandbox();
        let format = sandbox.new_instance(MEDIA_FORMAT, &[])?;
        sandbox.invoke(
            &format,
            &MemberSignature::new("setString", [TypeDesc::String, TypeDesc::String]),
            &[KEY_MIME.into(), self.mime.as_str().into()],
        )?;
        self.format = Some(format.clone());
        Ok(format)
    }
}

fn index_value(index: usize) -> Value {
    Value::Int(i32::try_from(index).unwrap_or(i32::MAX))
}

fn buffer_index(inv: &Invocation<'_>, arg: usize) -> Result<usize> {
    let index = inv.arg_int(arg)?;
    usize::try_from(index)
        .ok()
        .filter(|&i| i < BUFFER_COUNT)
        .ok_or_else(|| raise!("IndexOutOfBoundsException", "no buffer at index {}", index))
}

fn write_info(sandbox: &Sandbox, info: &ObjectRef, meta: BufferMeta) -> Result<()> {
    sandbox.invoke(
        info,
        &MemberSignature::new(
            "set",
            [TypeDesc::Int, TypeDesc::Int, TypeDesc::Long, TypeDesc::Int],
        ),
        &[
            Value::Int(0),
            Value::Int(meta.size),
            Value::Long(meta.presentation_time_us),
            Value::Int(meta.flags),
        ],
    )?;
    Ok(())
}

/// Posts a callback invocation to the sandbox queue.
fn notify(inv: &Invocation<'_>, callback: ObjectRef, member: MemberSignature, args: Vec<Value>) -> Result<()> {
    trace!("posting {}.{}", callback.class_name(), member);
    inv.post(move |sandbox| {
        sandbox.invoke(&callback, &member, &args)?;
        Ok(())
    })
}

fn codec_type() -> TypeDesc {
    TypeDesc::object(MEDIA_CODEC)
}

/// `Callback.onInputBufferAvailable(MediaCodec, int)`
#[must_use]
pub fn on_input_buffer_available() -> MemberSignature {
    MemberSignature::new("onInputBufferAvailable", [codec_type(), TypeDesc::Int])
}

/// `Callback.onOutputBufferAvailable(MediaCodec, int, BufferInfo)`
#[must_use]
pub fn on_output_buffer_available() -> MemberSignature {
    MemberSignature::new(
        "onOutputBufferAvailable",
        [codec_type(), TypeDesc::Int, TypeDesc::object(BUFFER_INFO)],
    )
}

/// `Callback.onOutputFormatChanged(MediaCodec, MediaFormat)`
#[must_use]
pub fn on_output_format_changed() -> MemberSignature {
    MemberSignature::new(
        "onOutputFormatChanged",
        [codec_type(), TypeDesc::object(MEDIA_FORMAT)],
    )
}

fn create(inv: &Invocation<'_>, encoder: bool) -> Result<Value> {
    let mime = inv.arg_str(0)?.to_string();
    let config = inv
        .statics(|statics: &mut CodecStatics| statics.lookup(&mime, encoder))?
        .unwrap_or_default();

    let sandbox = inv.sandbox();
    let codec = sandbox.new_instance(MEDIA_CODEC, &[])?;
    trace!("{} created {} for {} ({:?})", sandbox.id(), codec, mime, config);
    sandbox.with_shadow(&codec, |state: &mut CodecState| {
        state.mime = mime;
        state.encoder = encoder;
        state.config = config;
    })?;
    Ok(codec.into())
}

fn media_codec_class() -> Result<RealClass> {
    RealClass::builder(MEDIA_CODEC)
        .static_native("createEncoderByType", [TypeDesc::String], codec_type())
        .static_native("createDecoderByType", [TypeDesc::String], codec_type())
        .native(
            "configure",
            [TypeDesc::object(MEDIA_FORMAT), TypeDesc::Int],
            TypeDesc::Void,
        )
        .native("setCallback", [TypeDesc::object(CALLBACK)], TypeDesc::Void)
        .native("start", [], TypeDesc::Void)
        .native("stop", [], TypeDesc::Void)
        .native("release", [], TypeDesc::Void)
        .native("dequeueInputBuffer", [TypeDesc::Long], TypeDesc::Int)
        .native("getInputBuffer", [TypeDesc::Int], TypeDesc::Bytes)
        .native(
            "queueInputBuffer",
            [TypeDesc::Int, TypeDesc::Bytes, TypeDesc::Long, TypeDesc::Int],
            TypeDesc::Void,
        )
        .native(
            "dequeueOutputBuffer",
            [TypeDesc::object(BUFFER_INFO), TypeDesc::Long],
            TypeDesc::Int,
        )
        .native("getOutputBuffer", [TypeDesc::Int], TypeDesc::Bytes)
        .native("releaseOutputBuffer", [TypeDesc::Int, TypeDesc::Bool], TypeDesc::Void)
        .native("getOutputFormat", [], TypeDesc::object(MEDIA_FORMAT))
        .build()
}

fn buffer_info_class() -> Result<RealClass> {
    fn store(inv: &Invocation<'_>, offset: i32, size: i32, pts: i64, flags: i32) -> Result<Value> {
        inv.set_field("offset", Value::Int(offset))?;
        inv.set_field("size", Value::Int(size))?;
        inv.set_field("presentationTimeUs", Value::Long(pts))?;
        inv.set_field("flags", Value::Int(flags))?;
        Ok(Value::Void)
    }

    RealClass::builder(BUFFER_INFO)
        .constructor([], |inv| store(inv, 0, 0, 0, 0))
        .method(
            "set",
            [TypeDesc::Int, TypeDesc::Int, TypeDesc::Long, TypeDesc::Int],
            TypeDesc::Void,
            |inv| store(inv, inv.arg_int(0)?, inv.arg_int(1)?, inv.arg_long(2)?, inv.arg_int(3)?),
        )
        .build()
}

fn callback_class() -> Result<RealClass> {
    fn ignore(_: &Invocation<'_>) -> Result<Value> {
        Ok(Value::Void)
    }

    RealClass::builder(CALLBACK)
        .abstract_class()
        .method(
            "onInputBufferAvailable",
            on_input_buffer_available().params().to_vec(),
            TypeDesc::Void,
            ignore,
        )
        .method(
            "onOutputBufferAvailable",
            on_output_buffer_available().params().to_vec(),
            TypeDesc::Void,
            ignore,
        )
        .method(
            "onOutputFormatChanged",
            on_output_format_changed().params().to_vec(),
            TypeDesc::Void,
            ignore,
        )
        .build()
}

fn media_format_class() -> Result<RealClass> {
    RealClass::builder(MEDIA_FORMAT)
        .method(
            "setInteger",
            [TypeDesc::String, TypeDesc::Int],
            TypeDesc::Void,
            |inv| {
                inv.set_field(inv.arg_str(0)?, Value::Int(inv.arg_int(1)?))?;
                Ok(Value::Void)
            },
        )
        .method("getInteger", [TypeDesc::String], TypeDesc::Int, |inv| {
            let key = inv.arg_str(0)?;
            inv.field(key)?
                .as_int()
                .map(Value::Int)
                .ok_or_else(|| raise!("NullPointerException", "no integer for key '{}'", key))
        })
        .method(
            "setString",
            [TypeDesc::String, TypeDesc::String],
            TypeDesc::Void,
            |inv| {
                inv.set_field(inv.arg_str(0)?, inv.arg(1)?.clone())?;
                Ok(Value::Void)
            },
        )
        .method("getString", [TypeDesc::String], TypeDesc::String, |inv| {
            match inv.field(inv.arg_str(0)?)? {
                value @ (Value::Str(_) | Value::Null) => Ok(value),
                _ => Ok(Value::Null),
            }
        })
        .method("containsKey", [TypeDesc::String], TypeDesc::Bool, |inv| {
            Ok(Value::Bool(!inv.field(inv.arg_str(0)?)?.is_null()))
        })
        .build()
}

type CodecMethod = fn(&mut CodecState, &Invocation<'_>) -> Result<Value>;

/// Runs a codec method with the receiver's state locked for its duration.
///
/// Codec methods never call back into their own codec; callbacks are posted.
fn scoped(
    method: CodecMethod,
) -> impl Fn(&ShadowRef<'_, CodecState>, &Invocation<'_>) -> Result<Value> + Send + Sync + 'static {
    move |codec: &ShadowRef<'_, CodecState>, inv: &Invocation<'_>| {
        codec.with(|state| method(state, inv))?
    }
}

/// Builds the codec shadow.
///
/// # Errors
///
/// Declaration errors; none are expected for this fixed declaration.
pub fn shadow() -> Result<ShadowClass> {
    ShadowClass::builder::<CodecState>(SHADOW_MEDIA_CODEC)
        .implements(MEDIA_CODEC)
        .static_method("createEncoderByType", [TypeDesc::String], codec_type(), |inv| {
            create(inv, true)
        })
        .static_method("createDecoderByType", [TypeDesc::String], codec_type(), |inv| {
            create(inv, false)
        })
        .method(
            "configure",
            [TypeDesc::object(MEDIA_FORMAT), TypeDesc::Int],
            TypeDesc::Void,
            scoped(CodecState::configure),
        )
        .method(
            "setCallback",
            [TypeDesc::object(CALLBACK)],
            TypeDesc::Void,
            scoped(CodecState::set_callback),
        )
        .method("start", [], TypeDesc::Void, scoped(CodecState::start))
        .method("stop", [], TypeDesc::Void, scoped(CodecState::stop))
        .method("release", [], TypeDesc::Void, scoped(CodecState::release))
        .method(
            "dequeueInputBuffer",
            [TypeDesc::Long],
            TypeDesc::Int,
            scoped(CodecState::dequeue_input_buffer),
        )
        .method(
            "getInputBuffer",
            [TypeDesc::Int],
            TypeDesc::Bytes,
            scoped(CodecState::get_input_buffer),
        )
        .method(
            "queueInputBuffer",
            [TypeDesc::Int, TypeDesc::Bytes, TypeDesc::Long, TypeDesc::Int],
            TypeDesc::Void,
            scoped(CodecState::queue_input_buffer),
        )
        .method(
            "dequeueOutputBuffer",
            [TypeDesc::object(BUFFER_INFO), TypeDesc::Long],
            TypeDesc::Int,
            scoped(CodecState::dequeue_output_buffer),
        )
        .method(
            "getOutputBuffer",
            [TypeDesc::Int],
            TypeDesc::Bytes,
            scoped(CodecState::get_output_buffer),
        )
        .method(
            "releaseOutputBuffer",
            [TypeDesc::Int, TypeDesc::Bool],
            TypeDesc::Void,
            scoped(CodecState::release_output_buffer),
        )
        .method(
            "getOutputFormat",
            [],
            TypeDesc::object(MEDIA_FORMAT),
            scoped(CodecState::get_output_format),
        )
        .build()
}

/// Adds the codec classes to `class_path` and the codec shadow to `catalog`.
///
/// # Errors
///
/// Returns [`crate::ConfigError::DuplicateClass`] or
/// [`crate::ConfigError::DuplicateShadowName`] if already installed.
pub fn install(class_path: &mut ClassPath, catalog: &mut ShadowCatalog) -> Result<()> {
    class_path.add(media_format_class()?)?;
    class_path.add(buffer_info_class()?)?;
    class_path.add(callback_class()?)?;
    class_path.add(media_codec_class()?)?;
    catalog.register(shadow()?)
}
