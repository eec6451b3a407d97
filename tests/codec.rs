//! Integration tests for the `MediaCodec` shadow.
//!
//! Asynchronous scenarios use a recording subclass of `MediaCodec$Callback`
//! that counts every notification in its own fields.

use shadowbox::{
    prelude::*,
    shadows::{
        self,
        codec::{
            register_encoder, set_output_format, BufferInfo, CodecConfig, CodecState,
            BUFFER_FLAG_END_OF_STREAM, BUFFER_INFO, CALLBACK, CONFIGURE_FLAG_ENCODE,
            INFO_OUTPUT_FORMAT_CHANGED, INFO_TRY_AGAIN_LATER, KEY_MIME, KEY_SAMPLE_RATE,
            MEDIA_CODEC, MEDIA_FORMAT, SHADOW_MEDIA_CODEC,
        },
    },
};

const RECORDER: &str = "org.example.media.RecordingCallback";
const AUDIO_AAC: &str = "audio/mp4a-latm";

fn bump(inv: &Invocation<'_>, counter: &str) -> Result<()> {
    let count = inv.field(counter)?.as_int().unwrap_or(0);
    inv.set_field(counter, Value::Int(count + 1))
}

fn recorder_class() -> Result<RealClass> {
    let codec = TypeDesc::object(MEDIA_CODEC);
    RealClass::builder(RECORDER)
        .extends(CALLBACK)
        .method(
            "onInputBufferAvailable",
            [codec.clone(), TypeDesc::Int],
            TypeDesc::Void,
            |inv| {
                bump(inv, "inputs")?;
                inv.set_field("lastInput", inv.arg(1)?.clone())?;
                Ok(Value::Void)
            },
        )
        .method(
            "onOutputBufferAvailable",
            [codec.clone(), TypeDesc::Int, TypeDesc::object(BUFFER_INFO)],
            TypeDesc::Void,
            |inv| {
                bump(inv, "outputs")?;
                inv.set_field("lastOutput", inv.arg(1)?.clone())?;
                inv.set_field("lastInfo", inv.arg(2)?.clone())?;
                Ok(Value::Void)
            },
        )
        .method(
            "onOutputFormatChanged",
            [codec, TypeDesc::object(MEDIA_FORMAT)],
            TypeDesc::Void,
            |inv| {
                bump(inv, "formats")?;
                Ok(Value::Void)
            },
        )
        .build()
}

fn manager() -> Result<SandboxManager> {
    let mut class_path = ClassPath::new();
    let mut catalog = ShadowCatalog::new();
    shadows::install(&mut class_path, &mut catalog)?;
    class_path.add(recorder_class()?)?;
    Ok(SandboxManager::new(class_path, catalog))
}

fn config() -> SandboxConfig {
    SandboxConfig::new().shadow(SHADOW_MEDIA_CODEC)
}

fn sig(name: &str, params: impl IntoIterator<Item = TypeDesc>) -> MemberSignature {
    MemberSignature::new(name, params)
}

fn object(value: Value) -> Result<ObjectRef> {
    value
        .as_object()
        .cloned()
        .ok_or_else(|| Error::Error(format!("expected an object, got {}", value.kind_name())))
}

fn count(sandbox: &Sandbox, callback: &ObjectRef, counter: &str) -> Result<i32> {
    Ok(sandbox.get_field(callback, counter)?.as_int().unwrap_or(0))
}

fn create_encoder(sandbox: &Sandbox) -> Result<ObjectRef> {
    object(sandbox.invoke_static(
        MEDIA_CODEC,
        &sig("createEncoderByType", [TypeDesc::String]),
        &[AUDIO_AAC.into()],
    )?)
}

/// Creates, configures and starts an encoder, optionally in asynchronous mode.
fn start_encoder(sandbox: &Sandbox, callback: Option<&ObjectRef>) -> Result<ObjectRef> {
    let codec = create_encoder(sandbox)?;
    if let Some(callback) = callback {
        sandbox.invoke(
            &codec,
            &sig("setCallback", [TypeDesc::object(CALLBACK)]),
            &[callback.clone().into()],
        )?;
    }

    let format = sandbox.new_instance(MEDIA_FORMAT, &[])?;
    sandbox.invoke(
        &format,
        &sig("setString", [TypeDesc::String, TypeDesc::String]),
        &[KEY_MIME.into(), AUDIO_AAC.into()],
    )?;
    sandbox.invoke(
        &codec,
        &sig("configure", [TypeDesc::object(MEDIA_FORMAT), TypeDesc::Int]),
        &[format.into(), Value::Int(CONFIGURE_FLAG_ENCODE)],
    )?;
    sandbox.invoke(&codec, &sig("start", []), &[])?;
    Ok(codec)
}

fn queue_input(sandbox: &Sandbox, codec: &ObjectRef, index: Value, data: Vec<u8>, pts: i64, flags: i32) -> Result<Value> {
    sandbox.invoke(
        codec,
        &sig(
            "queueInputBuffer",
            [TypeDesc::Int, TypeDesc::Bytes, TypeDesc::Long, TypeDesc::Int],
        ),
        &[index, Value::Bytes(data), Value::Long(pts), Value::Int(flags)],
    )
}

fn dequeue_output(sandbox: &Sandbox, codec: &ObjectRef, info: &ObjectRef) -> Result<i32> {
    let index = sandbox.invoke(
        codec,
        &sig("dequeueOutputBuffer", [TypeDesc::object(BUFFER_INFO), TypeDesc::Long]),
        &[info.clone().into(), Value::Long(0)],
    )?;
    Ok(index.as_int().unwrap_or(i32::MIN))
}

fn output_bytes(sandbox: &Sandbox, codec: &ObjectRef, index: Value) -> Result<Vec<u8>> {
    let bytes = sandbox.invoke(codec, &sig("getOutputBuffer", [TypeDesc::Int]), &[index])?;
    Ok(bytes.as_bytes().map(<[u8]>::to_vec).unwrap_or_default())
}

#[test]
fn test_async_callbacks_are_delivered_on_idle() -> Result<()> {
    manager()?.run(&config(), |sandbox| {
        register_encoder(
            sandbox,
            AUDIO_AAC,
            CodecConfig::new(1000, 1000, |input, output| output.extend_from_slice(input)),
        )?;
        let callback = sandbox.new_instance(RECORDER, &[])?;
        let codec = start_encoder(sandbox, Some(&callback))?;

        // Nothing runs before the queue is drained.
        assert_eq!(count(sandbox, &callback, "inputs")?, 0);
        assert!(sandbox.pending_tasks()? > 0);

        sandbox.idle()?;
        assert_eq!(count(sandbox, &callback, "formats")?, 1);
        assert_eq!(count(sandbox, &callback, "inputs")?, 1);
        assert_eq!(count(sandbox, &callback, "outputs")?, 0);

        let input = sandbox.get_field(&callback, "lastInput")?;
        let buffer = sandbox.invoke(&codec, &sig("getInputBuffer", [TypeDesc::Int]), &[input.clone()])?;
        assert_eq!(buffer.as_bytes().map(<[u8]>::len), Some(1000));

        queue_input(sandbox, &codec, input, vec![7; 1000], 0, BUFFER_FLAG_END_OF_STREAM)?;
        assert_eq!(count(sandbox, &callback, "outputs")?, 0);

        sandbox.idle()?;
        assert_eq!(count(sandbox, &callback, "outputs")?, 1);
        assert_eq!(count(sandbox, &callback, "inputs")?, 1);

        let info = object(sandbox.get_field(&callback, "lastInfo")?)?;
        let info = BufferInfo::read(sandbox, &info)?;
        assert!(info.is_end_of_stream());
        assert_eq!(info.size, 1000);

        let output = sandbox.get_field(&callback, "lastOutput")?;
        assert_eq!(output_bytes(sandbox, &codec, output.clone())?, vec![7; 1000]);

        // After end of stream no further input is offered.
        sandbox.invoke(
            &codec,
            &sig("releaseOutputBuffer", [TypeDesc::Int, TypeDesc::Bool]),
            &[output, Value::Bool(false)],
        )?;
        sandbox.idle()?;
        assert_eq!(count(sandbox, &callback, "inputs")?, 1);

        let eos = sandbox.with_shadow(&codec, |state: &mut CodecState| state.reached_end_of_stream())?;
        assert!(eos);
        Ok(())
    })
}

#[test]
fn test_async_input_is_offered_after_release() -> Result<()> {
    manager()?.run(&config(), |sandbox| {
        let callback = sandbox.new_instance(RECORDER, &[])?;
        let codec = start_encoder(sandbox, Some(&callback))?;
        sandbox.idle()?;

        let input = sandbox.get_field(&callback, "lastInput")?;
        queue_input(sandbox, &codec, input, vec![1; 64], 10, 0)?;
        sandbox.idle()?;

        let info = BufferInfo::read(sandbox, &object(sandbox.get_field(&callback, "lastInfo")?)?)?;
        assert!(!info.is_end_of_stream());
        assert_eq!(info.presentation_time_us, 10);

        let output = sandbox.get_field(&callback, "lastOutput")?;
        sandbox.invoke(
            &codec,
            &sig("releaseOutputBuffer", [TypeDesc::Int, TypeDesc::Bool]),
            &[output, Value::Bool(false)],
        )?;
        sandbox.idle()?;
        assert_eq!(count(sandbox, &callback, "inputs")?, 2);

        let err = sandbox
            .invoke(&codec, &sig("dequeueInputBuffer", [TypeDesc::Long]), &[Value::Long(0)])
            .unwrap_err();
        assert_eq!(err.raised().map(|r| r.kind.as_str()), Some("IllegalStateException"));
        Ok(())
    })
}

#[test]
fn test_sync_encoder_round_trip() -> Result<()> {
    manager()?.run(&config(), |sandbox| {
        let codec = start_encoder(sandbox, None)?;
        let info = sandbox.new_instance(BUFFER_INFO, &[])?;

        // The format is reported before any output.
        assert_eq!(dequeue_output(sandbox, &codec, &info)?, INFO_OUTPUT_FORMAT_CHANGED);
        assert_eq!(dequeue_output(sandbox, &codec, &info)?, INFO_TRY_AGAIN_LATER);

        let input = sandbox.invoke(&codec, &sig("dequeueInputBuffer", [TypeDesc::Long]), &[Value::Long(0)])?;
        assert!(input.as_int().is_some_and(|i| i >= 0));
        let buffer = sandbox.invoke(&codec, &sig("getInputBuffer", [TypeDesc::Int]), &[input.clone()])?;
        assert_eq!(buffer.as_bytes().map(<[u8]>::len), Some(512));

        let data: Vec<u8> = (0..512).map(|i| (i % 251) as u8).collect();
        queue_input(sandbox, &codec, input, data.clone(), 123_456, BUFFER_FLAG_END_OF_STREAM)?;

        let index = dequeue_output(sandbox, &codec, &info)?;
        assert!(index >= 0);
        assert_eq!(
            BufferInfo::read(sandbox, &info)?,
            BufferInfo {
                offset: 0,
                size: 512,
                presentation_time_us: 123_456,
                flags: BUFFER_FLAG_END_OF_STREAM,
            }
        );
        assert_eq!(output_bytes(sandbox, &codec, Value::Int(index))?, data);
        assert_eq!(sandbox.pending_tasks()?, 0);
        Ok(())
    })
}

#[test]
fn test_custom_codec() -> Result<()> {
    manager()?.run(&config(), |sandbox| {
        register_encoder(
            sandbox,
            AUDIO_AAC,
            CodecConfig::new(1000, 100, |input, output| {
                output.extend_from_slice(&input[..input.len() / 10]);
            }),
        )?;
        let codec = start_encoder(sandbox, None)?;
        let info = sandbox.new_instance(BUFFER_INFO, &[])?;
        assert_eq!(dequeue_output(sandbox, &codec, &info)?, INFO_OUTPUT_FORMAT_CHANGED);

        let input = sandbox.invoke(&codec, &sig("dequeueInputBuffer", [TypeDesc::Long]), &[Value::Long(0)])?;
        let buffer = sandbox.invoke(&codec, &sig("getInputBuffer", [TypeDesc::Int]), &[input.clone()])?;
        assert_eq!(buffer.as_bytes().map(<[u8]>::len), Some(1000));

        let data: Vec<u8> = (0..1000).map(|i| (i % 256) as u8).collect();
        queue_input(sandbox, &codec, input, data.clone(), 0, 0)?;

        let index = dequeue_output(sandbox, &codec, &info)?;
        assert_eq!(BufferInfo::read(sandbox, &info)?.size, 100);
        assert_eq!(output_bytes(sandbox, &codec, Value::Int(index))?, data[..100].to_vec());

        let config = sandbox.with_shadow(&codec, |state: &mut CodecState| {
            (state.is_encoder(), state.config().input_buffer_size())
        })?;
        assert_eq!(config, (true, 1000));
        Ok(())
    })
}

#[test]
fn test_custom_codec_output_buffer_has_configured_capacity() -> Result<()> {
    manager()?.run(&config(), |sandbox| {
        register_encoder(sandbox, AUDIO_AAC, CodecConfig::new(0, 1000, |_, _| {}))?;
        let codec = start_encoder(sandbox, None)?;
        let info = sandbox.new_instance(BUFFER_INFO, &[])?;

        let input = sandbox.invoke(&codec, &sig("dequeueInputBuffer", [TypeDesc::Long]), &[Value::Long(0)])?;
        queue_input(sandbox, &codec, input, Vec::new(), 0, 0)?;
        assert_eq!(dequeue_output(sandbox, &codec, &info)?, INFO_OUTPUT_FORMAT_CHANGED);

        let index = dequeue_output(sandbox, &codec, &info)?;
        assert!(index >= 0);
        assert_eq!(output_bytes(sandbox, &codec, Value::Int(index))?.len(), 1000);
        assert_eq!(BufferInfo::read(sandbox, &info)?.size, 0);
        Ok(())
    })
}

#[test]
fn test_short_output_fills_front_of_buffer() -> Result<()> {
    manager()?.run(&config(), |sandbox| {
        let codec = start_encoder(sandbox, None)?;
        let info = sandbox.new_instance(BUFFER_INFO, &[])?;
        assert_eq!(dequeue_output(sandbox, &codec, &info)?, INFO_OUTPUT_FORMAT_CHANGED);

        let input = sandbox.invoke(&codec, &sig("dequeueInputBuffer", [TypeDesc::Long]), &[Value::Long(0)])?;
        queue_input(sandbox, &codec, input, vec![9; 64], 0, 0)?;

        let index = dequeue_output(sandbox, &codec, &info)?;
        let size = BufferInfo::read(sandbox, &info)?.size;
        let buffer = output_bytes(sandbox, &codec, Value::Int(index))?;
        assert_eq!(size, 64);
        assert_eq!(buffer.len(), 512);
        assert_eq!(&buffer[..64], &[9u8; 64]);
        assert!(buffer[64..].iter().all(|b| *b == 0));
        Ok(())
    })
}

#[test]
fn test_oversized_input_is_rejected() -> Result<()> {
    manager()?.run(&config(), |sandbox| {
        let codec = start_encoder(sandbox, None)?;
        let input = sandbox.invoke(&codec, &sig("dequeueInputBuffer", [TypeDesc::Long]), &[Value::Long(0)])?;

        let err = queue_input(sandbox, &codec, input, vec![0; 513], 0, 0).unwrap_err();
        assert_eq!(err.raised().map(|r| r.kind.as_str()), Some("BufferOverflowException"));
        Ok(())
    })
}

#[test]
fn test_output_format_override() -> Result<()> {
    manager()?.run(&config(), |sandbox| {
        let format = sandbox.new_instance(MEDIA_FORMAT, &[])?;
        sandbox.invoke(
            &format,
            &sig("setInteger", [TypeDesc::String, TypeDesc::Int]),
            &[KEY_SAMPLE_RATE.into(), Value::Int(44_100)],
        )?;
        set_output_format(sandbox, &format)?;

        let codec = start_encoder(sandbox, None)?;
        let reported = object(sandbox.invoke(&codec, &sig("getOutputFormat", []), &[])?)?;
        assert_eq!(reported, format);
        assert_eq!(
            sandbox.invoke(&reported, &sig("getInteger", [TypeDesc::String]), &[KEY_SAMPLE_RATE.into()])?,
            Value::Int(44_100)
        );
        Ok(())
    })
}

#[test]
fn test_lifecycle_violations() -> Result<()> {
    manager()?.run(&config(), |sandbox| {
        let codec = create_encoder(sandbox)?;

        let err = sandbox.invoke(&codec, &sig("start", []), &[]).unwrap_err();
        assert_eq!(err.raised().map(|r| r.kind.as_str()), Some("IllegalStateException"));

        sandbox.invoke(&codec, &sig("release", []), &[])?;
        let err = sandbox
            .invoke(&codec, &sig("dequeueInputBuffer", [TypeDesc::Long]), &[Value::Long(0)])
            .unwrap_err();
        assert!(err.raised().is_some());
        Ok(())
    })
}

#[test]
fn test_codec_registry_is_per_sandbox() -> Result<()> {
    let manager = manager()?;

    manager.run(&config(), |sandbox| {
        register_encoder(sandbox, AUDIO_AAC, CodecConfig::new(64, 64, |_, _| {}))
    })?;

    manager.run(&config(), |sandbox| {
        let codec = create_encoder(sandbox)?;
        let size = sandbox.with_shadow(&codec, |state: &mut CodecState| {
            state.config().input_buffer_size()
        })?;
        assert_eq!(size, 512);
        Ok(())
    })
}
